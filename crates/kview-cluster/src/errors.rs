//! Cluster query error types.

use thiserror::Error;

/// Errors returned by a cluster query.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport-level failure talking to the API server.
    #[error("request to api server failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server answered with a non-success status.
    #[error("api server returned {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// `message` from the returned `Status` object, or the raw body.
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("failed to decode api response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client could not be configured.
    #[error("invalid cluster configuration: {0}")]
    Config(String),

    /// Reading a token or CA file failed.
    #[error("failed to read credentials: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// HTTP status code, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for cluster queries.
pub type Result<T> = std::result::Result<T, ClusterError>;
