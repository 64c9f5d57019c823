//! Hub registry
//!
//! Process-wide map of live document rooms.

mod hub;

pub use hub::Hub;
