//! # collab-hub
//!
//! Real-time collaboration hub for shared proposals: tracks which editors
//! are looking at which section of a document and fans out "dataset
//! changed" notifications over WebSocket connections.

pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod hub;
pub mod presence;
pub mod room;
pub mod server;
pub mod types;

pub use auth::{Authenticator, JwtAuthenticator};
pub use broadcast::{ChangeBroadcaster, ChangeEvent, DeliveryReport};
pub use connection::{Connection, ConnectionState, Delivery};
pub use hub::Hub;
pub use presence::{LeaveOutcome, PresenceRegistry, SectionChange};
pub use room::{DocumentRoom, RoomError};
pub use server::{create_app, create_hub_state, run, serve, HubState};
pub use types::{DocumentId, Section, SessionId};
