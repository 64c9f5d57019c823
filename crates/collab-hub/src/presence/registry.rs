//! Per-document presence registry
//!
//! Holds the live members of one room and the section each of them last
//! reported. Snapshots are always rebuilt from the member set, never patched.
//! The registry is not synchronized on its own; the owning room serializes
//! every call.

use crate::connection::{Connection, Delivery};
use crate::types::{Section, SessionId};
use collab_common::{PresenceSnapshot, ServerMessage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug)]
struct Member {
    connection: Arc<Connection>,
    section: Section,
    joined: u64,
}

/// Outcome of a section change request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionChange {
    /// The member moved and a snapshot was published
    Moved { from: Section, version: u64 },
    /// Same section as before; nothing published
    Unchanged,
    /// The session is not a member of this registry
    NotMember,
}

/// Outcome of a leave request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The session was already gone
    NotMember,
    /// Removed; the remaining members got a fresh snapshot
    Left { remaining: usize },
    /// Removed the last member; the room should be torn down
    Emptied,
}

/// Section membership of one document room
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    members: HashMap<SessionId, Member>,
    next_join: u64,
    version: u64,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and publish to everyone, the joiner included
    ///
    /// Joining twice with the same session only updates its section.
    pub fn join(&mut self, connection: Arc<Connection>, section: Section) -> u64 {
        let session_id = connection.session_id();
        match self.members.get_mut(&session_id) {
            Some(member) => member.section = section,
            None => {
                let joined = self.next_join;
                self.next_join += 1;
                self.members.insert(
                    session_id,
                    Member {
                        connection,
                        section,
                        joined,
                    },
                );
            }
        }
        self.publish()
    }

    /// Move a member to another section
    pub fn change_section(&mut self, session_id: SessionId, section: Section) -> SectionChange {
        let Some(member) = self.members.get_mut(&session_id) else {
            return SectionChange::NotMember;
        };
        if member.section == section {
            return SectionChange::Unchanged;
        }

        let from = std::mem::replace(&mut member.section, section);
        let version = self.publish();
        SectionChange::Moved { from, version }
    }

    /// Remove a member
    ///
    /// Publishes to the remaining members, or reports `Emptied` without
    /// publishing when nobody is left.
    pub fn leave(&mut self, session_id: SessionId) -> LeaveOutcome {
        if self.members.remove(&session_id).is_none() {
            return LeaveOutcome::NotMember;
        }
        if self.members.is_empty() {
            return LeaveOutcome::Emptied;
        }

        self.publish();
        LeaveOutcome::Left {
            remaining: self.members.len(),
        }
    }

    /// Current snapshot, names listed in join order within each section
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by_key(|m| m.joined);

        // One entry per user per section, however many connections they hold
        let mut seen = HashSet::new();
        members
            .into_iter()
            .filter(|&m| seen.insert((m.section.as_str(), m.connection.identity().user_id.as_str())))
            .map(|m| (m.section.as_str(), m.connection.display_name()))
            .collect()
    }

    /// Connections currently in the registry
    #[must_use]
    pub fn recipients(&self) -> Vec<Arc<Connection>> {
        self.members.values().map(|m| Arc::clone(&m.connection)).collect()
    }

    /// Version of the last published snapshot (0 before the first)
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn section_of(&self, session_id: SessionId) -> Option<&Section> {
        self.members.get(&session_id).map(|m| &m.section)
    }

    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains_key(&session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn publish(&mut self) -> u64 {
        self.version += 1;
        let version = self.version;
        let presence = self.snapshot();

        for member in self.members.values() {
            let message = ServerMessage::Presence {
                version,
                presence: presence.clone(),
            };
            if member.connection.deliver(message) != Delivery::Queued {
                tracing::debug!(
                    session_id = %member.connection.session_id(),
                    version,
                    "Presence snapshot not delivered"
                );
            }
        }

        tracing::debug!(
            members = self.members.len(),
            version,
            "Presence published"
        );
        version
    }
}
