//! Token storage and management

use std::fmt;
use std::sync::Arc;

use crate::config::KeyValueStore;

/// Key of the bearer token entry in the backing store.
const TOKEN_KEY: &str = "bearer_token";

/// Bearer credential issued by the authorization server.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

/// Single-slot holder for the current bearer token.
///
/// Cloning shares the same backing store.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<AccessToken> {
        self.backend.get(TOKEN_KEY).map(AccessToken)
    }

    /// Replace the stored token. Storage failures are logged, not returned.
    pub fn set(&self, token: &AccessToken) {
        if let Err(e) = self.backend.set(TOKEN_KEY, token.secret()) {
            tracing::warn!("Failed to persist bearer token: {:#}", e);
        }
    }

    /// Remove the stored token. Clearing an empty store is a no-op.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(TOKEN_KEY) {
            tracing::warn!("Failed to clear bearer token: {:#}", e);
        }
    }
}
