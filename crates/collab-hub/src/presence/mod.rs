//! Presence tracking
//!
//! Who is looking at which section of a document.

mod registry;

pub use registry::{LeaveOutcome, PresenceRegistry, SectionChange};
