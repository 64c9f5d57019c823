//! # collab-client
//!
//! Editor-side half of the collaboration hub: connects to a proposal,
//! keeps the session alive, reports tab switches, and turns hub frames into
//! presence updates and cache invalidations.

pub mod error;
pub mod sections;
pub mod socket;

pub use error::{ClientError, ClientResult};
pub use sections::{section_for_table, TABLE_SECTIONS};
pub use socket::{ClientConfig, ClientEvent, ProposalSocket};
