//! Tab change handler

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::hub::Hub;
use crate::presence::SectionChange;
use crate::types::Section;

/// Handles `tab_change` messages
pub struct TabChangeHandler;

impl TabChangeHandler {
    /// Move the connection's presence entry to `tab`
    pub fn handle(hub: &Hub, connection: &Connection, tab: &str) -> HandlerResult<SectionChange> {
        let section = Section::parse(tab)
            .ok_or_else(|| HandlerError::InvalidPayload("tab must not be empty".to_string()))?;

        if !connection.is_active() {
            return Err(HandlerError::NotActive(connection.session_id()));
        }

        let change = hub.change_section(connection, section);
        if change == SectionChange::Unchanged {
            tracing::trace!(
                session_id = %connection.session_id(),
                tab,
                "Tab unchanged, nothing to publish"
            );
        }
        Ok(change)
    }
}
