//! # Sync Coordinator
//!
//! Runs one sync round for a local playlist against all of its enabled
//! targets.
//!
//! ## Workflow
//!
//! 1. Take the playlist's lock; rounds for one playlist never overlap.
//! 2. Load the local playlist and its enabled targets.
//! 3. Build and authenticate an adapter per target, concurrently. If none
//!    comes up the round fails with [`SyncError::AllTargetsFailed`].
//! 4. Read every remote playlist, concurrently, and load its baseline.
//! 5. Build a plan per target and filter it through the guardrail.
//! 6. Hand the plans to the [`PlanExecutor`].
//! 7. Persist the report's entries to the sync log.
//!
//! With `force_push` steps 4 and 5 are replaced: every target allowed to
//! send both adds and removals gets its remote contents replaced by the
//! local playlist.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//!
//! let report = coordinator.sync(playlist_id, false).await?;
//! let summary = report.summary();
//! println!("{} synced, {} failed", summary.synced, summary.failed);
//! ```

use bridge_traits::Clock;
use core_library::repositories::LocalPlaylistStore;
use core_library::PlaylistId;
use core_runtime::config::SyncOptions;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::adapter::{with_timeout, AdapterRegistry, AdapterResult, RemotePlaylistAdapter};
use crate::executor::{PlanExecutor, TargetRun};
use crate::guardrail::{apply_guardrail, GuardrailConfig, GuardrailOutcome};
use crate::plan::{bootstrap_plan, build_plan};
use crate::report::{GuardrailBlock, SyncReport, TargetLabel};
use crate::repository::{baseline_name, BaselineRepository, SyncLogRepository, SyncTargetRepository};
use crate::snapshot::PlaylistSnapshot;
use crate::target::SyncTarget;
use crate::{Result, SyncError};

/// A target whose adapter is built and authenticated.
struct ReadyTarget {
    target: SyncTarget,
    label: TargetLabel,
    adapter: Arc<dyn RemotePlaylistAdapter>,
}

/// Sync coordinator for playlist reconciliation rounds
pub struct SyncCoordinator {
    store: Arc<dyn LocalPlaylistStore>,
    targets: Arc<dyn SyncTargetRepository>,
    baselines: Arc<dyn BaselineRepository>,
    logs: Option<Arc<dyn SyncLogRepository>>,
    registry: Arc<AdapterRegistry>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    executor: PlanExecutor,

    /// One lock per playlist that has been synced
    locks: Mutex<HashMap<PlaylistId, Arc<Mutex<()>>>>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn LocalPlaylistStore>,
        targets: Arc<dyn SyncTargetRepository>,
        baselines: Arc<dyn BaselineRepository>,
        registry: Arc<AdapterRegistry>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        let executor = PlanExecutor::new(store.clone(), baselines.clone(), options.adapter_timeout);

        Self {
            store,
            targets,
            baselines,
            logs: None,
            registry,
            clock,
            options,
            executor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Persist every round's entries to `logs`.
    pub fn with_sync_log(mut self, logs: Arc<dyn SyncLogRepository>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Run one sync round for `playlist_id`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::PlaylistNotFound`] if the playlist does not exist
    /// - [`SyncError::AllTargetsFailed`] if no enabled target could be
    ///   initialized
    ///
    /// Any other per-target or per-change failure is recorded in the
    /// returned report.
    #[instrument(skip(self), fields(playlist_id = %playlist_id))]
    pub async fn sync(&self, playlist_id: PlaylistId, force_push: bool) -> Result<SyncReport> {
        let lock = self.playlist_lock(playlist_id).await;
        let _guard = lock.lock().await;

        let playlist = self
            .store
            .get_by_id(playlist_id)
            .await?
            .ok_or(SyncError::PlaylistNotFound { playlist_id })?;
        let local = PlaylistSnapshot::from_local(&playlist);
        let mut report = SyncReport::new(playlist_id, self.clock.now(), force_push);

        let targets: Vec<SyncTarget> = self
            .targets
            .targets_for_playlist(playlist_id)
            .await?
            .into_iter()
            .filter(|target| target.enabled)
            .collect();

        if targets.is_empty() {
            info!(playlist = %playlist.name, "No enabled sync targets");
            return Ok(report);
        }

        let count = targets.len();
        let ready = self.initialize_targets(&playlist.name, targets, &mut report).await;
        if ready.is_empty() {
            error!(count, "No sync target could be initialized");
            return Err(SyncError::AllTargetsFailed { count });
        }

        info!(
            playlist = %playlist.name,
            items = local.len(),
            targets = ready.len(),
            force_push,
            "Starting sync round"
        );

        if force_push {
            self.run_force_push(&local, ready, &mut report).await;
        } else {
            self.run_reconcile(playlist_id, &local, ready, &mut report).await;
        }

        self.persist_log(&report).await;

        let summary = report.summary();
        info!(
            synced = summary.synced,
            failed = summary.failed,
            failed_targets = summary.failed_targets,
            guardrail_blocks = report.guardrail_blocks.len(),
            outcome = ?summary.outcome,
            "Sync round finished"
        );

        Ok(report)
    }

    async fn playlist_lock(&self, playlist_id: PlaylistId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(playlist_id).or_default().clone()
    }

    /// Build and authenticate adapters. Targets that fail are recorded and
    /// left out.
    async fn initialize_targets(
        &self,
        local_name: &str,
        targets: Vec<SyncTarget>,
        report: &mut SyncReport,
    ) -> Vec<ReadyTarget> {
        let attempts = targets.into_iter().map(|target| async move {
            let label = TargetLabel {
                id: Some(target.id),
                service: target.service,
                name: target.remote_name(local_name),
            };

            let adapter = match self.registry.build(&target) {
                Ok(adapter) => adapter,
                Err(e) => return Err((label, e.to_string())),
            };

            match tokio::time::timeout(self.options.adapter_timeout, adapter.is_authenticated()).await {
                Ok(true) => Ok(ReadyTarget {
                    target,
                    label,
                    adapter,
                }),
                Ok(false) => Err((label, "not authenticated".to_string())),
                Err(_) => Err((
                    label,
                    format!(
                        "authentication check timed out after {:?}",
                        self.options.adapter_timeout
                    ),
                )),
            }
        });

        let mut ready = Vec::new();
        for attempt in join_all(attempts).await {
            match attempt {
                Ok(target) => ready.push(target),
                Err((label, error)) => {
                    warn!(service = %label.service, target = %label.name, error = %error, "Sync target failed to initialize");
                    report.record_target_failure(&label, error);
                }
            }
        }
        ready
    }

    /// Read every target's remote playlist concurrently.
    async fn read_remotes(
        &self,
        ready: Vec<ReadyTarget>,
    ) -> Vec<(ReadyTarget, AdapterResult<Option<PlaylistSnapshot>>)> {
        let reads = ready.into_iter().map(|target| async move {
            let remote = with_timeout(
                self.options.adapter_timeout,
                target.adapter.get_playlist_snapshot(&target.label.name),
            )
            .await;
            (target, remote)
        });

        join_all(reads).await
    }

    async fn run_reconcile(
        &self,
        playlist_id: PlaylistId,
        local: &PlaylistSnapshot,
        ready: Vec<ReadyTarget>,
        report: &mut SyncReport,
    ) {
        let mut runs = Vec::new();

        for (ready, remote) in self.read_remotes(ready).await {
            let ReadyTarget {
                target,
                label,
                adapter,
            } = ready;

            let remote = match remote {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(service = %label.service, target = %label.name, error = %e, "Failed to read remote playlist");
                    report.record_target_failure(&label, e.to_string());
                    continue;
                }
            };

            let baseline = match self
                .baselines
                .get_current_snapshot(&baseline_name(label.service, &label.name))
                .await
            {
                Ok(baseline) => baseline,
                Err(e) => {
                    error!(service = %label.service, target = %label.name, error = %e, "Failed to load baseline");
                    report.record_target_failure(&label, e.to_string());
                    continue;
                }
            };

            if let (Some(baseline), Some(remote)) = (&baseline, &remote) {
                if tracing::enabled!(Level::DEBUG) {
                    debug!(target = %label.name, diff = %baseline.diff(remote), "Remote changes since baseline");
                }
            }

            let plan = build_plan(baseline.as_ref(), remote.as_ref(), local, target.flags);
            let guardrail = GuardrailConfig::from_settings(&target.config.settings);
            let (plan, outcome) = apply_guardrail(plan, local.len(), &guardrail);

            if let GuardrailOutcome::Blocked {
                removals,
                local_size,
                ..
            } = outcome
            {
                report.guardrail_blocks.push(GuardrailBlock {
                    service: label.service,
                    target_name: label.name.clone(),
                    removals,
                    local_size,
                });
            }

            debug!(
                service = %label.service,
                target = %label.name,
                changes = plan.len(),
                creates_remote = plan.creates_remote,
                "Planned target"
            );

            runs.push(TargetRun {
                label,
                adapter,
                remote,
                plan,
            });
        }

        self.executor.execute(playlist_id, local, runs, report).await;
    }

    async fn run_force_push(
        &self,
        local: &PlaylistSnapshot,
        ready: Vec<ReadyTarget>,
        report: &mut SyncReport,
    ) {
        let (allowed, refused): (Vec<_>, Vec<_>) = ready
            .into_iter()
            .partition(|ready| ready.target.flags.allows_force_push());

        for ready in refused {
            warn!(service = %ready.label.service, target = %ready.label.name, "Force push refused by target flags");
            report.record_target_failure(
                &ready.label,
                "force push needs send_entry_adds and send_entry_removals",
            );
        }

        let mut runs = Vec::new();
        for (ready, remote) in self.read_remotes(allowed).await {
            match remote {
                Ok(remote) => runs.push(TargetRun {
                    label: ready.label,
                    adapter: ready.adapter,
                    remote,
                    plan: bootstrap_plan(local),
                }),
                Err(e) => {
                    warn!(service = %ready.label.service, target = %ready.label.name, error = %e, "Failed to read remote playlist");
                    report.record_target_failure(&ready.label, e.to_string());
                }
            }
        }

        self.executor.force_push(local, runs, report).await;
    }

    async fn persist_log(&self, report: &SyncReport) {
        let Some(logs) = &self.logs else {
            return;
        };

        if let Err(e) = logs
            .record(
                report.round_id,
                report.playlist_id,
                &report.entries,
                self.clock.now().timestamp_millis(),
            )
            .await
        {
            error!(round_id = %report.round_id, error = %e, "Failed to persist sync log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterFactory, BatchOutcome};
    use crate::repository::{SqliteBaselineRepository, SqliteSyncTargetRepository};
    use crate::target::{NewSyncTarget, TargetConfig};
    use async_trait::async_trait;
    use bridge_traits::SystemClock;
    use core_auth::ServiceKind;
    use core_library::db::create_test_pool;
    use core_library::repositories::SqlitePlaylistStore;
    use core_library::PlaylistItem;
    use mockall::mock;

    mock! {
        pub Adapter {}

        #[async_trait]
        impl RemotePlaylistAdapter for Adapter {
            fn service(&self) -> ServiceKind;
            async fn is_authenticated(&self) -> bool;
            async fn get_playlist_snapshot(&self, name: &str) -> AdapterResult<Option<PlaylistSnapshot>>;
            async fn create_playlist(&self, name: &str, snapshot: &PlaylistSnapshot) -> AdapterResult<BatchOutcome>;
            async fn add_items(&self, name: &str, items: &[PlaylistItem]) -> AdapterResult<BatchOutcome>;
            async fn remove_items(&self, name: &str, items: &[PlaylistItem]) -> AdapterResult<BatchOutcome>;
            async fn fetch_media_item(&self, item: &PlaylistItem) -> AdapterResult<Option<PlaylistItem>>;
            async fn clear_playlist(&self, name: &str) -> AdapterResult<()>;
        }
    }

    struct MockFactory {
        service: ServiceKind,
        authenticated: bool,
    }

    impl AdapterFactory for MockFactory {
        fn service(&self) -> ServiceKind {
            self.service
        }

        fn build(&self, _target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>> {
            let mut adapter = MockAdapter::new();
            let authenticated = self.authenticated;
            adapter.expect_is_authenticated().returning(move || authenticated);
            adapter.expect_get_playlist_snapshot().never();
            Ok(Arc::new(adapter))
        }
    }

    async fn coordinator(
        registry: AdapterRegistry,
    ) -> (SyncCoordinator, Arc<SqlitePlaylistStore>, Arc<SqliteSyncTargetRepository>) {
        let pool = create_test_pool().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let options = SyncOptions::default();

        let store = Arc::new(SqlitePlaylistStore::new(pool.clone(), clock.clone(), options.order_step));
        let targets = Arc::new(SqliteSyncTargetRepository::new(pool.clone()));
        let baselines = Arc::new(SqliteBaselineRepository::new(pool.clone(), options.baseline_name_max_len));

        let coordinator = SyncCoordinator::new(
            store.clone(),
            targets.clone(),
            baselines,
            Arc::new(registry),
            clock,
            options,
        );
        (coordinator, store, targets)
    }

    #[tokio::test]
    async fn test_unknown_playlist_is_an_error() {
        let (coordinator, _, _) = coordinator(AdapterRegistry::new()).await;

        let result = coordinator.sync(PlaylistId(42), false).await;
        assert!(matches!(
            result,
            Err(SyncError::PlaylistNotFound { playlist_id: PlaylistId(42) })
        ));
    }

    #[tokio::test]
    async fn test_playlist_without_targets_is_a_quiet_success() {
        let (coordinator, store, targets) = coordinator(AdapterRegistry::new()).await;
        let playlist = store.create("Mix").await.unwrap();
        targets
            .insert(&NewSyncTarget::new(playlist.id, ServiceKind::Plex).disabled())
            .await
            .unwrap();

        let report = coordinator.sync(playlist.id, false).await.unwrap();
        assert!(report.entries.is_empty());
        assert!(report.target_failures.is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_targets_fail_the_round() {
        let registry = AdapterRegistry::new()
            .with_factory(Arc::new(MockFactory {
                service: ServiceKind::Spotify,
                authenticated: false,
            }));
        let (coordinator, store, targets) = coordinator(registry).await;
        let playlist = store.create("Mix").await.unwrap();

        targets
            .insert(&NewSyncTarget::new(playlist.id, ServiceKind::Spotify))
            .await
            .unwrap();
        // No factory registered for YouTube
        targets
            .insert(
                &NewSyncTarget::new(playlist.id, ServiceKind::YouTube)
                    .with_config(TargetConfig::named("Mix (yt)")),
            )
            .await
            .unwrap();

        let result = coordinator.sync(playlist.id, false).await;
        assert!(matches!(result, Err(SyncError::AllTargetsFailed { count: 2 })));
    }
}
