//! CLI error types with exit code handling

use miette::Diagnostic;
use thiserror::Error;

use keel_server::ServiceError;

use crate::exit_codes;

/// CLI error carrying its exit code class
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("{message}")]
    #[diagnostic(code(keel::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(
        code(keel::cli::permission_denied),
        help("check the rules in policy.yaml for this subject")
    )]
    PermissionDenied { message: String },

    #[error("{message}")]
    #[diagnostic(code(keel::cli::not_found))]
    NotFound { message: String },

    #[error("{message}")]
    #[diagnostic(code(keel::cli::conflict))]
    Conflict {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(
        code(keel::cli::unavailable),
        help("verify the URL and credentials, or rerun with --debug")
    )]
    Unavailable { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(keel::cli::io))]
    Io { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(keel::cli::internal))]
    Internal { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::PermissionDenied { .. } => exit_codes::PERMISSION_DENIED,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Conflict { .. } => exit_codes::CONFLICT,
            CliError::Unavailable { .. } => exit_codes::UNAVAILABLE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<ServiceError> for CliError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err.code() {
            "InvalidArgument" => CliError::Validation {
                message,
                help: None,
            },
            "PermissionDenied" => CliError::PermissionDenied { message },
            "NotFound" => CliError::NotFound { message },
            "AlreadyExists" | "FailedPrecondition" => CliError::Conflict {
                help: matches!(err, ServiceError::Conflict { .. })
                    .then(|| "rerun with --upsert to replace the registration".to_string()),
                message,
            },
            "Unavailable" => CliError::Unavailable { message },
            _ => CliError::Internal { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
