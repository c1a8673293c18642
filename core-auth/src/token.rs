//! Access-token sources consumed by the adapters.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ServiceKind;

/// Supplies bearer tokens for one service.
///
/// Adapters call [`access_token`](TokenSource::access_token) before every
/// request and [`invalidate`](TokenSource::invalidate) after a 401, so the
/// next call refreshes instead of replaying the rejected token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Current access token, refreshing it first if needed.
    async fn access_token(&self) -> Result<String>;

    /// Drop any cached token.
    async fn invalidate(&self);
}

/// A token that never changes, such as a Plex server token.
pub struct StaticToken {
    service: ServiceKind,
    token: String,
}

impl StaticToken {
    pub fn new(service: ServiceKind, token: impl Into<String>) -> Self {
        Self {
            service,
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("service", &self.service)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    fn service(&self) -> ServiceKind {
        self.service
    }

    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    // A static token cannot be refreshed; the adapter's auth check reports it.
    async fn invalidate(&self) {}
}
