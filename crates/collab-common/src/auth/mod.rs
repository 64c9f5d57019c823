//! Token authentication

mod jwt;

pub use jwt::{Claims, Identity, JwtService};
