//! Document rooms
//!
//! A room is the unit of isolation: one per live document, holding its
//! members and their presence.

mod room;

pub use room::{DocumentRoom, RoomError};
