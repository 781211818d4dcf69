//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid repository URL: {url}")]
    InvalidLocation { url: String },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CoreError::InvalidLocation {
            url: "not a url".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid repository URL: not a url");

        let err = CoreError::InvalidConfig {
            message: "TLS client cert and key must be set together".to_string(),
        };
        assert!(err.to_string().starts_with("Invalid repository configuration:"));
    }
}
