//! Document room
//!
//! All membership and presence mutations of a document go through one
//! mutex, so presence snapshots leave the room in version order. Change
//! fan-out only takes the lock long enough to copy the recipient list.

use crate::broadcast::{ChangeBroadcaster, ChangeEvent, DeliveryReport};
use crate::connection::{Connection, ConnectionState};
use crate::presence::{LeaveOutcome, PresenceRegistry, SectionChange};
use crate::types::{DocumentId, Section, SessionId};
use collab_common::PresenceSnapshot;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Reasons a room refuses a join
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Torn down after its last member left; join a fresh room instead
    #[error("Room {0} is closed")]
    Closed(DocumentId),

    /// The connection was opened for another document
    #[error("Connection for {connection} cannot join room {room}")]
    DocumentMismatch {
        room: DocumentId,
        connection: DocumentId,
    },

    /// The connection closed before it could be registered
    #[error("Connection {0} is no longer open")]
    ConnectionClosed(SessionId),
}

#[derive(Debug, Default)]
struct RoomState {
    presence: PresenceRegistry,
    closed: bool,
}

/// Runtime aggregate of one document's connections
#[derive(Debug)]
pub struct DocumentRoom {
    document_id: DocumentId,
    state: Mutex<RoomState>,
    broadcaster: ChangeBroadcaster,
}

impl DocumentRoom {
    #[must_use]
    pub fn new(document_id: DocumentId, broadcaster: ChangeBroadcaster) -> Self {
        tracing::debug!(document_id = %document_id, "Room created");
        Self {
            document_id,
            state: Mutex::new(RoomState::default()),
            broadcaster,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Register an authenticated connection and publish presence
    ///
    /// Returns the version of the snapshot the join produced.
    ///
    /// # Errors
    /// `Closed` once the room has been torn down; the caller retries on a
    /// fresh room.
    pub fn join(&self, connection: &Arc<Connection>, section: Section) -> Result<u64, RoomError> {
        if connection.document_id() != &self.document_id {
            return Err(RoomError::DocumentMismatch {
                room: self.document_id.clone(),
                connection: connection.document_id().clone(),
            });
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(RoomError::Closed(self.document_id.clone()));
        }
        if !connection.transition(ConnectionState::Active) && !connection.is_active() {
            return Err(RoomError::ConnectionClosed(connection.session_id()));
        }

        tracing::info!(
            document_id = %self.document_id,
            session_id = %connection.session_id(),
            section = %section,
            "Joined room"
        );
        Ok(state.presence.join(Arc::clone(connection), section))
    }

    /// Move a member to another section
    pub fn change_section(&self, session_id: SessionId, section: Section) -> SectionChange {
        let mut state = self.state.lock();
        let change = state.presence.change_section(session_id, section);
        if let SectionChange::Moved { from, version } = &change {
            tracing::debug!(
                document_id = %self.document_id,
                session_id = %session_id,
                from = %from,
                to = ?state.presence.section_of(session_id).map(Section::as_str),
                version,
                "Section changed"
            );
        }
        change
    }

    /// Remove a member; closes the room when it was the last one
    pub fn leave(&self, session_id: SessionId) -> LeaveOutcome {
        let mut state = self.state.lock();
        let outcome = state.presence.leave(session_id);
        if outcome == LeaveOutcome::Emptied {
            state.closed = true;
        }
        if outcome != LeaveOutcome::NotMember {
            tracing::info!(
                document_id = %self.document_id,
                session_id = %session_id,
                outcome = ?outcome,
                "Left room"
            );
        }
        outcome
    }

    /// Notify every other member that `table` changed
    pub fn publish_change(&self, table: &str, origin: Option<SessionId>) -> DeliveryReport {
        let recipients = {
            let state = self.state.lock();
            if state.closed {
                return DeliveryReport::default();
            }
            state.presence.recipients()
        };

        let mut event = ChangeEvent::new(self.document_id.clone(), table);
        event.origin = origin;
        self.broadcaster.publish(&event, &recipients)
    }

    /// Version and contents of the current presence snapshot
    pub fn presence(&self) -> (u64, PresenceSnapshot) {
        let state = self.state.lock();
        (state.presence.version(), state.presence.snapshot())
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().presence.len()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.state.lock().presence.contains(session_id)
    }

    /// Whether the room has been torn down
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
