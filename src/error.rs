//! Error taxonomy for calls into the data/analysis service

use thiserror::Error;

/// Failure of a single service call.
///
/// Every variant is recoverable: callers keep their previous state and the
/// user may retry the action that triggered the call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The request never produced a response (connection refused, timeout, ...)
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("{operation} failed: {status} {message}")]
    Http {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The request was rejected before reaching the data
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

impl From<csv::Error> for ServiceError {
    fn from(err: csv::Error) -> Self {
        ServiceError::InvalidRequest(format!("csv encoding failed: {}", err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
