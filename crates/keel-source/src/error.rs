//! Error types for source client operations

use thiserror::Error;

use keel_core::CoreError;

/// Source client errors
#[derive(Debug, Error)]
pub enum SourceError {
    // ============ Revision Errors ============
    #[error("Unable to resolve '{revision}' to a revision: {reason}")]
    UnresolvableRevision { revision: String, reason: String },

    #[error("invalid resolved revision \"{revision}\", must be resolved")]
    UnresolvedRevisionUsed { revision: String },

    #[error("unknown chart \"{name}\"")]
    UnknownPackage { name: String },

    // ============ Git Errors ============
    #[error("git error: {message}")]
    Git { message: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    // ============ Authentication Errors ============
    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Invalid TLS material: {message}")]
    InvalidTls { message: String },

    // ============ Index Errors ============
    #[error("Index not found at {url}")]
    IndexNotFound { url: String },

    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    #[error("Integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    // ============ Working Tree Errors ============
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for source client operations
pub type Result<T> = std::result::Result<T, SourceError>;

impl SourceError {
    /// Connectivity-class failures, reported as connection state rather than call errors
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SourceError::Git { .. }
                | SourceError::HttpError { .. }
                | SourceError::NetworkError { .. }
                | SourceError::Timeout { .. }
                | SourceError::AuthRequired { .. }
                | SourceError::AuthFailed { .. }
                | SourceError::InvalidTls { .. }
                | SourceError::IndexNotFound { .. }
                | SourceError::IndexParseError { .. }
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            SourceError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            SourceError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            SourceError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for SourceError {
    fn from(e: serde_yaml::Error) -> Self {
        SourceError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for SourceError {
    fn from(e: url::ParseError) -> Self {
        SourceError::NetworkError {
            message: format!("invalid URL: {}", e),
        }
    }
}
