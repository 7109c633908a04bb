//! # Error Handling
//!
//! Errors for the two outbound clients: the realtime speech link and
//! the post-call extraction pipeline.
//!
//! The HTTP surface has no fallible handlers, and relay-path errors
//! (malformed frames on either direction) are never surfaced to the
//! caller; they are logged at the relay and the frame is dropped. So
//! there is no `ResponseError` impl here: nothing maps these errors to
//! an HTTP response.

use std::fmt;

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Speech-API realtime link failure (connect, handshake, send)
    Upstream(String),

    /// Post-call extraction pipeline failure (completion or webhook)
    Extraction(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Upstream(msg) => write!(f, "Upstream link error: {}", msg),
            AppError::Extraction(msg) => write!(f, "Extraction error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Extraction(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Shorthand for results using the application error type.
pub type AppResult<T> = Result<T, AppError>;
