//! Integration test utilities for the collaboration hub
//!
//! Spawns the real hub on an ephemeral port and drives it over HTTP and
//! WebSocket.

pub mod helpers;

pub use helpers::*;
