//! Hub
//!
//! Routes connections to their document room, creating rooms on first join
//! and dropping them when the last member leaves. Uses `DashMap` for
//! concurrent access; a room is only ever removed from the map together with
//! an identity check, so a replacement room is never evicted by mistake.

use crate::broadcast::{ChangeBroadcaster, DeliveryReport};
use crate::connection::{Connection, ConnectionState};
use crate::presence::{LeaveOutcome, SectionChange};
use crate::room::{DocumentRoom, RoomError};
use crate::types::{DocumentId, Section, SessionId};
use collab_common::{HubConfig, Identity, PresenceSnapshot, ServerMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Registry of document rooms
pub struct Hub {
    rooms: DashMap<DocumentId, Arc<DocumentRoom>>,
    broadcaster: ChangeBroadcaster,
    heartbeat_interval_ms: u64,
}

impl Hub {
    /// Create a new hub
    #[must_use]
    pub fn new(config: &HubConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            broadcaster: ChangeBroadcaster::new(config.exclude_origin),
            heartbeat_interval_ms: config.heartbeat_interval_ms,
        }
    }

    /// Create a new hub wrapped in Arc
    #[must_use]
    pub fn new_shared(config: &HubConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Open a connection for an authenticated identity and attach it to the
    /// document's room
    ///
    /// The connection's first queued frame is `hello`, followed by the
    /// presence snapshot produced by the join.
    ///
    /// # Errors
    /// Only if the connection is closed while it is being attached.
    pub fn route_connect(
        &self,
        document_id: DocumentId,
        identity: Identity,
        section: Section,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<Connection>, RoomError> {
        let connection = Connection::new(SessionId::generate(), document_id, identity, sender);
        connection.transition(ConnectionState::Authenticated);
        connection.deliver(ServerMessage::Hello {
            session_id: connection.session_id().to_string(),
            heartbeat_interval: self.heartbeat_interval_ms,
        });

        if let Err(e) = self.attach(&connection, section) {
            connection.close();
            return Err(e);
        }
        Ok(connection)
    }

    /// Join `connection` to its document's room, retrying when the room it
    /// found was torn down in the meantime
    fn attach(&self, connection: &Arc<Connection>, section: Section) -> Result<u64, RoomError> {
        let document_id = connection.document_id();
        loop {
            let room = Arc::clone(
                self.rooms
                    .entry(document_id.clone())
                    .or_insert_with(|| {
                        Arc::new(DocumentRoom::new(document_id.clone(), self.broadcaster.clone()))
                    })
                    .value(),
            );

            match room.join(connection, section.clone()) {
                Err(RoomError::Closed(_)) => {
                    tracing::debug!(
                        document_id = %document_id,
                        session_id = %connection.session_id(),
                        "Room closed during join, retrying"
                    );
                    self.rooms.remove_if(document_id, |_, current| Arc::ptr_eq(current, &room));
                }
                result => return result,
            }
        }
    }

    /// Forward a section change to the connection's room
    pub fn change_section(&self, connection: &Connection, section: Section) -> SectionChange {
        match self.room(connection.document_id()) {
            Some(room) => room.change_section(connection.session_id(), section),
            None => SectionChange::NotMember,
        }
    }

    /// Remove a connection from its room and close it
    ///
    /// Safe to call any number of times; only the first call has an effect.
    /// An emptied room is dropped from the registry.
    pub fn disconnect(&self, connection: &Connection) -> LeaveOutcome {
        let document_id = connection.document_id();
        let outcome = match self.room(document_id) {
            Some(room) => {
                let outcome = room.leave(connection.session_id());
                if outcome == LeaveOutcome::Emptied {
                    self.rooms.remove_if(document_id, |_, current| Arc::ptr_eq(current, &room));
                    tracing::debug!(document_id = %document_id, "Room removed");
                }
                outcome
            }
            None => LeaveOutcome::NotMember,
        };

        if connection.close() {
            tracing::info!(
                session_id = %connection.session_id(),
                document_id = %document_id,
                lifetime_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
                dropped = connection.dropped_count(),
                "Connection closed"
            );
        }
        outcome
    }

    /// Tell the document's members that `table` changed
    ///
    /// No room means nobody is listening; the call is a no-op.
    pub fn notify_mutation(
        &self,
        document_id: &DocumentId,
        table: &str,
        origin: Option<SessionId>,
    ) -> DeliveryReport {
        match self.room(document_id) {
            Some(room) => room.publish_change(table, origin),
            None => {
                tracing::trace!(document_id = %document_id, table, "No room for change notification");
                DeliveryReport::default()
            }
        }
    }

    /// Current presence of a document, if it has a room
    pub fn presence(&self, document_id: &DocumentId) -> Option<(u64, PresenceSnapshot)> {
        self.room(document_id).map(|room| room.presence())
    }

    /// Get a room by document id
    pub fn room(&self, document_id: &DocumentId) -> Option<Arc<DocumentRoom>> {
        self.rooms.get(document_id).map(|r| Arc::clone(r.value()))
    }

    pub fn has_room(&self, document_id: &DocumentId) -> bool {
        self.rooms.contains_key(document_id)
    }

    /// Number of live rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections across all rooms
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|r| r.value().connection_count()).sum()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("rooms", &self.rooms.len())
            .field("exclude_origin", &self.broadcaster.excludes_origin())
            .finish()
    }
}
