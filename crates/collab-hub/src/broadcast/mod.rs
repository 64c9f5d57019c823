//! Change broadcasting
//!
//! Fans "dataset changed" notifications out to the connections of one room.

mod broadcaster;

pub use broadcaster::{ChangeBroadcaster, ChangeEvent, DeliveryReport};
