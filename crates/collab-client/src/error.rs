//! Client error types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL or proposal id cannot form a connect URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Tab label contains characters the hub does not accept
    #[error("Invalid tab: {0:?}")]
    InvalidTab(String),

    /// The hub refused the connect request
    #[error("Connection rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The hub did not answer in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The hub sent something unexpected during the handshake
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection has ended
    #[error("Connection closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    Transport(Box<tungstenite::Error>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the token was refused
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 })
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => Self::Rejected {
                status: response.status().as_u16(),
            },
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
            other => Self::Transport(Box::new(other)),
        }
    }
}

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;
