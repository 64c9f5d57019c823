//! Hub state
//!
//! Application state shared by the WebSocket and HTTP handlers.

use crate::auth::Authenticator;
use crate::hub::Hub;
use collab_common::AppConfig;
use std::sync::Arc;

/// Hub application state
///
/// Holds all shared dependencies for the server.
#[derive(Clone)]
pub struct HubState {
    /// Registry of live document rooms
    hub: Arc<Hub>,
    /// Token validation
    authenticator: Arc<dyn Authenticator>,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl HubState {
    /// Create a new hub state
    pub fn new(hub: Arc<Hub>, authenticator: Arc<dyn Authenticator>, config: AppConfig) -> Self {
        Self {
            hub,
            authenticator,
            config: Arc::new(config),
        }
    }

    /// Get the hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the authenticator
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for HubState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubState")
            .field("hub", &self.hub)
            .field("config", &"AppConfig")
            .finish()
    }
}
