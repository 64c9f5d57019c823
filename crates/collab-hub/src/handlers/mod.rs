//! Inbound message handlers
//!
//! Decodes client frames and routes them to the matching handler.

mod error;
mod heartbeat;
mod tab_change;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use tab_change::TabChangeHandler;

use crate::connection::Connection;
use crate::hub::Hub;
use collab_common::ClientMessage;

/// Dispatch incoming client messages to appropriate handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Decode a text frame
    pub fn decode(text: &str) -> HandlerResult<ClientMessage> {
        Ok(ClientMessage::from_json(text)?)
    }

    /// Handle a decoded client message
    pub fn dispatch(hub: &Hub, connection: &Connection, message: ClientMessage) -> HandlerResult<()> {
        tracing::trace!(
            session_id = %connection.session_id(),
            message = ?message,
            "Received message"
        );

        match message {
            ClientMessage::TabChange { tab } => {
                TabChangeHandler::handle(hub, connection, &tab).map(|_| ())
            }
            ClientMessage::Heartbeat => HeartbeatHandler::handle(connection),
        }
    }

    /// Decode and handle a text frame
    pub fn handle_text(hub: &Hub, connection: &Connection, text: &str) -> HandlerResult<()> {
        let message = Self::decode(text)?;
        Self::dispatch(hub, connection, message)
    }
}
