//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] into the shared Rust core: it opens the
//! database, registers an adapter factory for every service with
//! credentials and hands host applications a single [`CoreService`] to drive
//! sync rounds through. Desktop apps typically enable the `desktop-shims`
//! feature, which lets the config fall back to the reqwest HTTP client.

pub mod error;

pub use core_runtime::config::{CoreConfig, SyncOptions};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use error::{CoreError, Result};

use std::sync::Arc;

use core_auth::ServiceKind;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::Playlist;
use core_library::repositories::{SqliteEntryOrdering, SqliteMusicFileRepository, SqlitePlaylistStore};
use core_library::PlaylistId;
use core_sync::{
    AdapterRegistry, NewSyncTarget, SqliteBaselineRepository, SqliteSyncLogRepository,
    SqliteSyncTargetRepository, StoredLogEntry, SyncCoordinator, SyncLogRepository, SyncReport,
    SyncTarget, SyncTargetRepository,
};
use provider_plex::PlexAdapterFactory;
use provider_spotify::SpotifyAdapterFactory;
use provider_youtube::YouTubeAdapterFactory;
use tracing::info;

/// Adapter factories for every service `config` holds credentials for.
pub fn build_registry(config: &CoreConfig) -> AdapterRegistry {
    let read_retries = config.sync.read_retries;
    let item_timeout = config.sync.adapter_timeout;
    let mut registry = AdapterRegistry::new();

    if let Some(plex) = &config.credentials.plex {
        registry.register(Arc::new(PlexAdapterFactory::new(
            config.http_client.clone(),
            config.clock.clone(),
            plex.clone(),
            read_retries,
        )
        .with_item_timeout(item_timeout)));
    }
    if let Some(spotify) = &config.credentials.spotify {
        registry.register(Arc::new(SpotifyAdapterFactory::new(
            config.http_client.clone(),
            config.clock.clone(),
            spotify,
            read_retries,
        )
        .with_item_timeout(item_timeout)));
    }
    if let Some(youtube) = &config.credentials.youtube {
        registry.register(Arc::new(YouTubeAdapterFactory::new(
            config.http_client.clone(),
            config.clock.clone(),
            youtube,
            read_retries,
        )
        .with_item_timeout(item_timeout)));
    }

    registry
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    library: Arc<SqliteMusicFileRepository>,
    playlists: Arc<SqlitePlaylistStore>,
    ordering: Arc<SqliteEntryOrdering>,
    targets: Arc<SqliteSyncTargetRepository>,
    logs: Arc<SqliteSyncLogRepository>,
    coordinator: Arc<SyncCoordinator>,
}

impl CoreService {
    /// Open the database and assemble the sync engine.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let registry = build_registry(&config);

        info!(
            database = %config.database_path.display(),
            services = ?registry.services(),
            "Bootstrapping core service"
        );

        let library = Arc::new(SqliteMusicFileRepository::new(pool.clone()));
        let ordering = Arc::new(SqliteEntryOrdering::new(
            pool.clone(),
            config.clock.clone(),
            config.sync.order_step,
        ));
        let playlists = Arc::new(SqlitePlaylistStore::new(
            pool.clone(),
            config.clock.clone(),
            config.sync.order_step,
        ));
        let targets = Arc::new(SqliteSyncTargetRepository::new(pool.clone()));
        let baselines = Arc::new(SqliteBaselineRepository::new(
            pool.clone(),
            config.sync.baseline_name_max_len,
        ));
        let logs = Arc::new(SqliteSyncLogRepository::new(pool));

        let coordinator = SyncCoordinator::new(
            playlists.clone(),
            targets.clone(),
            baselines,
            Arc::new(registry),
            config.clock.clone(),
            config.sync.clone(),
        )
        .with_sync_log(logs.clone());

        Ok(Self {
            library,
            playlists,
            ordering,
            targets,
            logs,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Library tracks and albums.
    pub fn library(&self) -> Arc<SqliteMusicFileRepository> {
        Arc::clone(&self.library)
    }

    /// The local playlist store.
    pub fn playlists(&self) -> Arc<SqlitePlaylistStore> {
        Arc::clone(&self.playlists)
    }

    /// Entry listing, positional insert and reorder.
    pub fn ordering(&self) -> Arc<SqliteEntryOrdering> {
        Arc::clone(&self.ordering)
    }

    /// Services with a registered adapter.
    pub fn supported_services(&self) -> Vec<ServiceKind> {
        self.coordinator.registry().services()
    }

    pub async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        Ok(self.playlists.create(name).await?)
    }

    /// Attach a remote mirror to a playlist.
    ///
    /// # Errors
    ///
    /// [`CoreError::InitializationFailed`] if no adapter is registered for
    /// the target's service.
    pub async fn add_sync_target(&self, target: NewSyncTarget) -> Result<SyncTarget> {
        if !self.coordinator.registry().supports(target.service) {
            return Err(CoreError::InitializationFailed(format!(
                "no credentials configured for {}",
                target.service
            )));
        }
        Ok(self.targets.insert(&target).await?)
    }

    pub async fn sync_targets(&self, playlist_id: PlaylistId) -> Result<Vec<SyncTarget>> {
        Ok(self.targets.targets_for_playlist(playlist_id).await?)
    }

    /// Run one sync round; see [`SyncCoordinator::sync`].
    pub async fn sync(&self, playlist_id: PlaylistId, force_push: bool) -> Result<SyncReport> {
        Ok(self.coordinator.sync(playlist_id, force_push).await?)
    }

    /// Latest sync log entries of a playlist, newest first.
    pub async fn recent_sync_log(
        &self,
        playlist_id: PlaylistId,
        limit: u32,
    ) -> Result<Vec<StoredLogEntry>> {
        Ok(self.logs.recent(playlist_id, limit).await?)
    }
}
