//! # Remote Playlist Adapters
//!
//! One [`RemotePlaylistAdapter`] implementation per music service, each
//! bound to a single sync target. The coordinator never names a concrete
//! service: it asks the [`AdapterRegistry`] to build an adapter from the
//! target's service tag.
//!
//! ## Contract
//!
//! - Reads return `Ok(None)` when the remote playlist does not exist.
//! - Items without a remote-native ID are resolved through
//!   [`fetch_media_item`](RemotePlaylistAdapter::fetch_media_item), one item
//!   at a time under its own deadline. Items with no match land in
//!   [`BatchOutcome::skipped`]; items whose search failed or timed out land
//!   in [`BatchOutcome::failed`]. Neither aborts the batch.
//! - Batch sizes and paging stay inside the adapter.

use async_trait::async_trait;
use core_auth::{AuthError, ServiceKind};
use core_library::matching::{get_album_match_score, get_match_score};
use core_library::PlaylistItem;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::snapshot::PlaylistSnapshot;
use crate::target::SyncTarget;

/// Failure at the boundary to a remote service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Timed out after {limit:?}")]
    Timeout { limit: Duration },
}

impl AdapterError {
    /// Whether a read may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::TransientNetwork(_))
    }
}

impl From<AuthError> for AdapterError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(inner) if inner.is_transient() => {
                AdapterError::TransientNetwork(inner.to_string())
            }
            AuthError::MissingCredentials(message) => AdapterError::Configuration(message),
            other => AdapterError::Authentication(other.to_string()),
        }
    }
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// An item a batch could not carry because its own lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: PlaylistItem,
    pub error: AdapterError,
}

/// Result of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items written, carrying any remote ID resolved on the way
    pub applied: Vec<PlaylistItem>,
    /// Items the service has no match for
    pub skipped: Vec<PlaylistItem>,
    /// Items whose resolution errored or timed out; worth another attempt
    pub failed: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.applied.extend(other.applied);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Items of a batch sorted by how their remote ID lookup went.
///
/// `K` is the service's write handle for an item (rating key, URI, video ID).
#[derive(Debug)]
pub struct Resolution<K> {
    pub ready: Vec<(PlaylistItem, K)>,
    pub skipped: Vec<PlaylistItem>,
    pub failed: Vec<ItemFailure>,
}

impl<K> Default for Resolution<K> {
    fn default() -> Self {
        Self {
            ready: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<K: Clone> Resolution<K> {
    /// Queue an item that already carries its handle.
    pub fn known(&mut self, item: &PlaylistItem, key: K) {
        self.ready.push((item.clone(), key));
    }

    /// Record one search result. `key` extracts the handle from the match.
    pub fn record(
        &mut self,
        item: &PlaylistItem,
        found: AdapterResult<Option<PlaylistItem>>,
        key: impl FnOnce(&PlaylistItem) -> Option<K>,
    ) {
        match found {
            Ok(Some(found)) => match key(&found) {
                Some(handle) => {
                    let mut applied = item.clone();
                    applied.merge_identity_keys(&found);
                    self.ready.push((applied, handle));
                }
                None => self.skipped.push(item.clone()),
            },
            Ok(None) => {
                warn!(track = %item, "No remote match, skipping");
                self.skipped.push(item.clone());
            }
            Err(error) => {
                warn!(track = %item, error = %error, "Remote lookup failed, leaving item for the next round");
                self.failed.push(ItemFailure {
                    item: item.clone(),
                    error,
                });
            }
        }
    }

    pub fn keys(&self) -> Vec<K> {
        self.ready.iter().map(|(_, key)| key.clone()).collect()
    }

    pub fn into_outcome(self) -> BatchOutcome {
        BatchOutcome {
            applied: self.ready.into_iter().map(|(item, _)| item).collect(),
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Playlist operations one music service supports.
#[async_trait]
pub trait RemotePlaylistAdapter: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Live credential check. A failure drops cached credentials.
    async fn is_authenticated(&self) -> bool;

    /// Current remote playlist, or `None` if it does not exist.
    async fn get_playlist_snapshot(&self, name: &str) -> AdapterResult<Option<PlaylistSnapshot>>;

    /// Create the remote playlist seeded with `snapshot`'s items.
    ///
    /// When the target is bound to an existing remote playlist ID, that
    /// playlist's contents are replaced instead.
    async fn create_playlist(
        &self,
        name: &str,
        snapshot: &PlaylistSnapshot,
    ) -> AdapterResult<BatchOutcome>;

    async fn add_items(&self, name: &str, items: &[PlaylistItem]) -> AdapterResult<BatchOutcome>;

    async fn remove_items(&self, name: &str, items: &[PlaylistItem])
        -> AdapterResult<BatchOutcome>;

    /// Search the service for `item`, returning the best candidate.
    async fn fetch_media_item(&self, item: &PlaylistItem) -> AdapterResult<Option<PlaylistItem>>;

    /// Remove every item from the remote playlist.
    async fn clear_playlist(&self, name: &str) -> AdapterResult<()>;
}

/// Builds adapters for one service.
pub trait AdapterFactory: Send + Sync {
    fn service(&self) -> ServiceKind;

    fn build(&self, target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>>;
}

/// Dispatch table from service tag to adapter factory.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    factories: HashMap<ServiceKind, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for its service.
    pub fn register(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories.insert(factory.service(), factory);
    }

    pub fn with_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn supports(&self, service: ServiceKind) -> bool {
        self.factories.contains_key(&service)
    }

    pub fn services(&self) -> Vec<ServiceKind> {
        let mut services: Vec<_> = self.factories.keys().copied().collect();
        services.sort();
        services
    }

    /// Build the adapter for a target.
    pub fn build(&self, target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>> {
        let factory = self.factories.get(&target.service).ok_or_else(|| {
            AdapterError::Configuration(format!("no adapter registered for {}", target.service))
        })?;
        factory.build(target)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("services", &self.services())
            .finish()
    }
}

/// Run an adapter call under a deadline.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> AdapterResult<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout { limit }),
    }
}

/// Deadline for one call carrying `changes` changes: `per_change` each.
pub fn batch_deadline(per_change: Duration, changes: usize) -> Duration {
    let changes = u32::try_from(changes.max(1)).unwrap_or(u32::MAX);
    per_change.saturating_mul(changes)
}

/// Top-ranked search result for `item`.
///
/// Candidates are ranked by track score, then by album score when `item`
/// has an album; the first one wins ties. Any non-empty candidate list
/// yields a pick.
pub fn pick_candidate(item: &PlaylistItem, candidates: Vec<PlaylistItem>) -> Option<PlaylistItem> {
    let album_score = |candidate: &PlaylistItem| match (&item.album, &candidate.album) {
        (Some(wanted), Some(found)) => get_album_match_score(
            &(item.artist.as_str(), wanted.as_str()),
            &(candidate.artist.as_str(), found.as_str()),
        ),
        _ => 0,
    };

    candidates
        .into_iter()
        .map(|candidate| {
            let rank = (get_match_score(item, &candidate), album_score(&candidate));
            (candidate, rank)
        })
        .fold(None, |best: Option<(PlaylistItem, (u32, u32))>, (candidate, rank)| match best {
            Some((_, best_rank)) if best_rank >= rank => best,
            _ => Some((candidate, rank)),
        })
        .map(|(candidate, _)| candidate)
}
