// Error taxonomy for the upload flow. Failures are split by where they
// happen: before the request (file, configuration), on the wire (network,
// timeout), or after a response arrived (remote, opt-in only).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Cannot read file {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Request timed out{}", timeout_suffix(.0))]
    Timeout(Option<Duration>),

    #[error("Remote error: {status} {reason}")]
    Remote { status: u16, reason: String },
}

fn timeout_suffix(limit: &Option<Duration>) -> String {
    match limit {
        Some(d) => format!(" after {:?}", d),
        None => String::new(),
    }
}

impl UploadError {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn network<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Network(error.into())
    }

    /// Transport failures may succeed on a second attempt; the uploader
    /// itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Network(_) | UploadError::Timeout(_))
    }

    /// True for failures raised before any byte went on the wire.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            UploadError::FileAccess { .. } | UploadError::Configuration(_)
        )
    }
}
