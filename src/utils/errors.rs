use std::path::PathBuf;
use thiserror::Error;

use crate::models::PodKey;

/// Errors raised by the pod bookkeeping structures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PodError {
    #[error("Identity conflict: {new} already tracks a different download (moving from {old})")]
    IdentityConflict { old: PodKey, new: PodKey },

    #[error("Pod not found: {0}")]
    UnknownPod(PodKey),

    #[error("Session is no longer running")]
    SessionClosed,
}

/// Errors reported by the download host service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Download host unavailable: {0}")]
    Unavailable(String),

    #[error("Download not found: {0}")]
    NotFound(String),

    #[error("Host action failed: {0}")]
    Action(String),
}

/// Errors reported by the filesystem collaborator
#[derive(Error, Debug)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Map an IO error on `path`, keeping "not found" distinguishable
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io(error)
        }
    }
}

/// Errors raised while loading preferences
#[derive(Error, Debug)]
pub enum PrefError {
    #[error("Failed to read preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse preferences: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors reported by the inference API
///
/// Rate limiting is kept apart from other HTTP failures: the rename pipeline
/// surfaces it to the user and releases the file for a later attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Rate limited (retry after: {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("HTTP error: {message} (status: {status})")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Response contained no text")]
    EmptyResponse,

    #[error("Request cancelled")]
    Cancelled,

    #[error("No API key configured")]
    MissingApiKey,
}

impl InferenceError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Create an error from a reqwest error
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Network(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            Self::Network(format!("Connection failed: {}", error))
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }

    /// Create an error from a non-success HTTP status
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            _ => Self::Http {
                status,
                message: body,
            },
        }
    }
}
