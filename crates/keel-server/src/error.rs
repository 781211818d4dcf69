//! Error types for repository service operations

use thiserror::Error;

use keel_core::{AppSourceType, CoreError};
use keel_source::SourceError;

/// Repository service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    // ============ Caller Errors ============
    #[error("{message}")]
    Validation { message: String },

    #[error("permission denied: {action} {resource}/{object}")]
    PermissionDenied {
        action: String,
        resource: String,
        object: String,
    },

    #[error("repository '{url}' not found")]
    NotFound { url: String },

    #[error("repository '{url}' already exists")]
    AlreadyExists { url: String },

    #[error("{message}")]
    Conflict { message: String },

    // ============ Revision Errors ============
    #[error("Unable to resolve '{revision}' to a revision: {reason}")]
    UnresolvableRevision { revision: String, reason: String },

    #[error("invalid resolved revision \"{revision}\", must be resolved")]
    UnresolvedRevisionUsed { revision: String },

    #[error("unknown chart \"{name}\"")]
    UnknownPackage { name: String },

    // ============ Application Errors ============
    #[error("unsupported application source type: {source_type}")]
    UnsupportedSourceType { source_type: AppSourceType },

    #[error("invalid manifest {path}: {message}")]
    InvalidManifest { path: String, message: String },

    // ============ Collaborator Errors ============
    #[error(transparent)]
    Source(SourceError),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Status code name, in the style of RPC status codes
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "InvalidArgument",
            ServiceError::PermissionDenied { .. } => "PermissionDenied",
            ServiceError::NotFound { .. } => "NotFound",
            ServiceError::AlreadyExists { .. } => "AlreadyExists",
            ServiceError::Conflict { .. } => "FailedPrecondition",
            ServiceError::UnresolvableRevision { .. } => "NotFound",
            ServiceError::UnresolvedRevisionUsed { .. } => "InvalidArgument",
            ServiceError::UnknownPackage { .. } => "NotFound",
            ServiceError::UnsupportedSourceType { .. } => "InvalidArgument",
            ServiceError::InvalidManifest { .. } => "FailedPrecondition",
            ServiceError::Source(_) => "Unavailable",
            ServiceError::Store { .. } | ServiceError::Cache { .. } | ServiceError::Internal { .. } => {
                "Internal"
            }
        }
    }

    /// Errors the caller caused and can fix by changing the request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation { .. }
                | ServiceError::PermissionDenied { .. }
                | ServiceError::NotFound { .. }
                | ServiceError::Conflict { .. }
                | ServiceError::UnresolvableRevision { .. }
                | ServiceError::UnresolvedRevisionUsed { .. }
                | ServiceError::UnknownPackage { .. }
                | ServiceError::UnsupportedSourceType { .. }
        )
    }
}

impl From<CoreError> for ServiceError {
    fn from(e: CoreError) -> Self {
        ServiceError::Validation {
            message: e.to_string(),
        }
    }
}

impl From<SourceError> for ServiceError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::UnresolvableRevision { revision, reason } => {
                ServiceError::UnresolvableRevision { revision, reason }
            }
            SourceError::UnresolvedRevisionUsed { revision } => {
                ServiceError::UnresolvedRevisionUsed { revision }
            }
            SourceError::UnknownPackage { name } => ServiceError::UnknownPackage { name },
            SourceError::Core(core) => core.into(),
            SourceError::InvalidPattern { pattern, message } => ServiceError::Validation {
                message: format!("invalid path pattern '{}': {}", pattern, message),
            },
            other => ServiceError::Source(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::Cache {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Cache {
            message: format!("invalid cached state: {}", e),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Internal {
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServiceError::Internal {
            message: format!("worker failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_keep_their_class() {
        let err: ServiceError = SourceError::UnknownPackage {
            name: "wordpress1".to_string(),
        }
        .into();
        assert_eq!(err.code(), "NotFound");
        assert_eq!(err.to_string(), "unknown chart \"wordpress1\"");

        let err: ServiceError = SourceError::UnresolvedRevisionUsed {
            revision: String::new(),
        }
        .into();
        assert_eq!(err.code(), "InvalidArgument");

        let err: ServiceError = SourceError::Git {
            message: "fatal: repository not found".to_string(),
        }
        .into();
        assert_eq!(err.code(), "Unavailable");
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_core_errors_are_validation() {
        let err: ServiceError = CoreError::InvalidLocation {
            url: "nope".to_string(),
        }
        .into();
        assert_eq!(err.code(), "InvalidArgument");
        assert!(err.is_caller_error());
    }
}
