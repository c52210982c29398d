use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RtvmError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Network Error: failed to fetch '{0}': {1}")]
    Network(String, String),

    #[error("Parsing Error in {0}: {1}")]
    Parse(&'static str, String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Version {0} not found in the release catalog")]
    UnknownVersion(String),

    #[error("No suitable package found for {0} on {1}")]
    NoSuitableArtifact(String, String),

    #[error("Version {0} is already installed")]
    AlreadyInstalled(String),

    #[error("Version {0} is not installed")]
    NotInstalled(String),

    #[error("Cannot uninstall currently active version {0}")]
    ActiveVersionInUse(String),

    #[error("Digest Mismatch: {0}")]
    DigestMismatch(String),

    #[error("Archive Format Error: {0}")]
    Format(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("IoError: {0}")]
    IoError(String),
}

impl RtvmError {
    /// Whether a failed network attempt may be retried against the same base.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RtvmError::Network(..)
                | RtvmError::Http(_)
                | RtvmError::Json(_)
                | RtvmError::Parse(..)
                | RtvmError::Io(_)
                | RtvmError::IoError(_)
        )
    }
}

impl From<std::io::Error> for RtvmError {
    fn from(err: std::io::Error) -> Self {
        RtvmError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for RtvmError {
    fn from(err: reqwest::Error) -> Self {
        RtvmError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for RtvmError {
    fn from(err: serde_json::Error) -> Self {
        RtvmError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RtvmError>;
