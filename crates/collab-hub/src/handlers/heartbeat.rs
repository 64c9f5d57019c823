//! Heartbeat handler

use super::{HandlerError, HandlerResult};
use crate::connection::{Connection, Delivery};
use collab_common::ServerMessage;

/// Handles heartbeat messages
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Acknowledge a client heartbeat
    ///
    /// The idle timer was already reset when the frame arrived.
    pub fn handle(connection: &Connection) -> HandlerResult<()> {
        tracing::trace!(
            session_id = %connection.session_id(),
            idle_ms = u64::try_from(connection.idle_for().as_millis()).unwrap_or(u64::MAX),
            "Heartbeat received"
        );

        match connection.deliver(ServerMessage::HeartbeatAck) {
            Delivery::Closed => Err(HandlerError::ConnectionClosed(connection.session_id())),
            Delivery::Queued | Delivery::Dropped => Ok(()),
        }
    }
}
