//! Client error types

use thiserror::Error;

/// Errors returned by roster and stream-control calls
#[derive(Error, Debug)]
pub enum ClientError {
    /// Endpoint string is not a usable URL
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint {
        endpoint: String,
        message: String,
    },

    /// Network-level failure (connect, DNS, timeout)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },

    /// Success status but the body did not match the contract
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Why a single poll cycle produced no frame
///
/// Carried by [`crate::PollResult::Failure`]. Unlike [`ClientError`] it is
/// cheap to clone so it can be stored on a camera record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// Timeout, refused connection, DNS failure
    #[error("{0}")]
    Transport(String),

    /// Any status other than 200 or 204
    #[error("HTTP {0}")]
    Server(u16),

    /// 200 with a body that is not a frame response
    #[error("invalid frame response: {0}")]
    InvalidBody(String),
}

impl PollFailure {
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            format!("failed to fetch frame: {}", err)
        };
        PollFailure::Transport(message)
    }
}
