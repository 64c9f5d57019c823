//! Handler error types

use crate::types::SessionId;
use thiserror::Error;

/// Handler error type
///
/// None of these end the session; the reader logs them and keeps going.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Frame was not a known client message
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Event arrived on a connection that is not registered in a room
    #[error("Connection {0} is not active")]
    NotActive(SessionId),

    /// The writer side is gone; the session is ending anyway
    #[error("Connection {0} is closed")]
    ConnectionClosed(SessionId),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
