//! Wire protocol shared by the hub and its clients
//!
//! Every frame is a JSON text object tagged by `type`.

mod close_codes;
mod messages;
mod presence;

pub use close_codes::CloseCode;
pub use messages::{ClientMessage, ServerMessage};
pub use presence::PresenceSnapshot;
