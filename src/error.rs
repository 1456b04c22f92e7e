//! Error types for scoretrack
//!
//! Per-task errors are always localized to the affected task record; nothing
//! in this taxonomy is allowed to take down the tracker or the polling loop.
//! Note that a 404 from the status endpoint is deliberately NOT an error:
//! the client maps it to a synthetic [`crate::Status::NotFound`] response.

use thiserror::Error;

/// Result type alias for scoretrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scoretrack
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a non-2xx status (other than 404 on a status poll)
    #[error("transport error{}: {message}", fmt_status(.status))]
    Transport {
        /// HTTP status code, when one was received
        status: Option<u16>,
        /// Response body or failure description
        message: String,
    },

    /// Network-level failure (connect, timeout, protocol)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local rejection before any network call (e.g. upload with no staged file)
    #[error("validation error: {0}")]
    Validation(String),

    /// The post-completion detail fetch failed
    ///
    /// Never reverts the task's terminal status; the result payload simply
    /// stays absent or partial.
    #[error("result fetch failed: {0}")]
    ResultFetch(String),

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g. "base_url")
        key: Option<String>,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl Error {
    /// Transport error from an HTTP status code and response body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Error::Transport {
            status: Some(status),
            message: body.into(),
        }
    }
}
