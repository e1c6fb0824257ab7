use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("Filesystem error at {path}: {message}")]
    FileSystem { path: PathBuf, message: String },

    #[error("Failed to parse expiry date for {domain}: {message}")]
    Parse { domain: String, message: String },

    #[error("Command `{command}` failed ({status}): {stderr}")]
    ExternalCommand {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Notification transport error: {message}")]
    Transport { message: String },

    #[error("Invalid schedule expression '{expression}': {message}")]
    Schedule { expression: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    FileSystem,
    Parse,
    ExternalCommand,
    Transport,
    Startup,
}

impl CertError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CertError::FileSystem { .. } => ErrorCategory::FileSystem,
            CertError::Parse { .. } => ErrorCategory::Parse,
            CertError::ExternalCommand { .. } | CertError::CommandTimeout { .. } => {
                ErrorCategory::ExternalCommand
            }
            CertError::Transport { .. } => ErrorCategory::Transport,
            CertError::Schedule { .. }
            | CertError::ConfigError { .. }
            | CertError::MissingConfigError { .. }
            | CertError::InvalidConfigValueError { .. } => ErrorCategory::Startup,
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        CertError::Transport {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CertError>;
