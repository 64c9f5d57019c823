//! Connection authentication
//!
//! The hub never inspects tokens itself; it asks an `Authenticator`.

use async_trait::async_trait;
use collab_common::{AppResult, Identity, JwtService};

/// Turns an opaque token into the identity it belongs to
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate `token` and return its identity
    ///
    /// # Errors
    /// An authentication error when the token is missing, malformed, or
    /// expired.
    async fn authenticate(&self, token: &str) -> AppResult<Identity>;
}

/// Validates HS256 access tokens issued by the login service
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    jwt: JwtService,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> AppResult<Identity> {
        self.jwt.validate(token)
    }
}
