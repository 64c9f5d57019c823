//! WebSocket close codes
//!
//! Codes the hub uses when it ends a session itself.

use serde::{Deserialize, Serialize};

/// Hub WebSocket close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Orderly shutdown of the session
    Normal = 1000,
    /// The session could not be set up after the upgrade
    UnknownError = 4000,
    /// No inbound activity within the idle window
    IdleTimeout = 4009,
}

impl CloseCode {
    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Session closed",
            Self::UnknownError => "Unknown error occurred",
            Self::IdleTimeout => "Idle timeout",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
