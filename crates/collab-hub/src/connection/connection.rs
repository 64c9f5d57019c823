//! Individual editor connection
//!
//! Holds identity, lifecycle state, and the sending half of the bounded
//! outbound queue drained by the connection's writer task.

use crate::types::{DocumentId, SessionId};
use collab_common::{Identity, ServerMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Connection lifecycle
///
/// `Connecting -> Authenticated -> Active -> Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, identity not yet verified
    Connecting,
    /// Identity verified, not yet registered in a room
    Authenticated,
    /// Registered in its document room
    Active,
    /// Deregistered; never reused
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticated)
                | (Self::Authenticated, Self::Active)
                | (Self::Connecting | Self::Authenticated | Self::Active, Self::Closed)
        )
    }
}

/// Result of handing a message to a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the writer task
    Queued,
    /// Queue full; the message was discarded
    Dropped,
    /// Writer task is gone
    Closed,
}

/// A single editor session scoped to one document
pub struct Connection {
    session_id: SessionId,
    document_id: DocumentId,
    identity: Identity,
    state: Mutex<ConnectionState>,
    sender: mpsc::Sender<ServerMessage>,
    last_activity: Mutex<Instant>,
    dropped: AtomicU64,
    created_at: Instant,
}

impl Connection {
    /// Create a new connection in the `Connecting` state
    pub fn new(
        session_id: SessionId,
        document_id: DocumentId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            session_id,
            document_id,
            identity,
            state: Mutex::new(ConnectionState::Connecting),
            sender,
            last_activity: Mutex::new(now),
            dropped: AtomicU64::new(0),
            created_at: now,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Move to `next` if the lifecycle allows it; returns whether it moved
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            tracing::trace!(
                session_id = %self.session_id,
                from = ?*state,
                to = ?next,
                "Connection state change"
            );
            *state = next;
            true
        } else {
            false
        }
    }

    /// Mark the connection closed; true only for the call that closed it
    pub fn close(&self) -> bool {
        self.transition(ConnectionState::Closed)
    }

    /// Record inbound activity
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queue a message without waiting
    ///
    /// A full queue means the peer is not keeping up; the message is
    /// discarded so the caller never stalls on one slow consumer.
    pub fn deliver(&self, message: ServerMessage) -> Delivery {
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(message)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    session_id = %self.session_id,
                    kind = message.kind(),
                    dropped,
                    "Outbound queue full, message dropped"
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Messages discarded because the outbound queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Check if the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("document_id", &self.document_id)
            .field("user_id", &self.identity.user_id)
            .field("state", &self.state())
            .finish()
    }
}
