//! Change broadcaster
//!
//! Delivery is fire-and-forget: each recipient gets a non-blocking enqueue
//! and a recipient that cannot take the message simply misses it.

use crate::connection::{Connection, Delivery};
use crate::types::{DocumentId, SessionId};
use collab_common::ServerMessage;
use serde::Serialize;
use std::sync::Arc;

/// A dataset of a document was just mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub document_id: DocumentId,
    /// Logical dataset name, e.g. `pricing_rows`
    pub table: String,
    /// Session that made the change, if known
    pub origin: Option<SessionId>,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(document_id: DocumentId, table: impl Into<String>) -> Self {
        Self {
            document_id,
            table: table.into(),
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: SessionId) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Per-publish delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Enqueued for a recipient
    pub delivered: usize,
    /// Recipient queue full or closed
    pub dropped: usize,
    /// Origin or not active; never attempted
    pub skipped: usize,
}

/// Fans change notifications out to a recipient set
#[derive(Debug, Clone)]
pub struct ChangeBroadcaster {
    exclude_origin: bool,
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ChangeBroadcaster {
    /// `exclude_origin` skips the publishing session when it is named
    #[must_use]
    pub fn new(exclude_origin: bool) -> Self {
        Self { exclude_origin }
    }

    #[must_use]
    pub fn excludes_origin(&self) -> bool {
        self.exclude_origin
    }

    /// Deliver `event` to every active recipient
    pub fn publish(&self, event: &ChangeEvent, recipients: &[Arc<Connection>]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for connection in recipients {
            let is_origin = event.origin == Some(connection.session_id());
            if !connection.is_active() || (self.exclude_origin && is_origin) {
                report.skipped += 1;
                continue;
            }

            match connection.deliver(ServerMessage::change(event.table.as_str())) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Dropped | Delivery::Closed => report.dropped += 1,
            }
        }

        tracing::debug!(
            document_id = %event.document_id,
            table = %event.table,
            delivered = report.delivered,
            dropped = report.dropped,
            skipped = report.skipped,
            "Change notification published"
        );

        report
    }
}
