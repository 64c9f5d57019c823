//! Editor connections
//!
//! A connection is the hub-side handle of one WebSocket session.

mod connection;

pub use connection::{Connection, ConnectionState, Delivery};

#[cfg(test)]
pub(crate) use connection::test_support;
