//! # collab-common
//!
//! Shared utilities for the collaboration hub: configuration, error handling,
//! token authentication, telemetry, and the wire protocol spoken with clients.

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Claims, Identity, JwtService};
pub use config::{
    AppConfig, AppSettings, ConfigError, CorsConfig, Environment, HubConfig, JwtConfig,
    ServerConfig,
};
pub use error::{AppError, AppResult, ErrorResponse};
pub use protocol::{ClientMessage, CloseCode, PresenceSnapshot, ServerMessage};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
