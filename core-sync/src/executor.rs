//! # Plan Executor
//!
//! Applies filtered plans of every target of one playlist.
//!
//! ## Workflow
//!
//! 1. Plans are merged: a remote-sourced change for a track that an earlier
//!    target already brought in is dropped.
//! 2. Plans are walked in target order. Remote-sourced changes mutate the
//!    local playlist immediately, one item at a time. Local-sourced changes
//!    are buffered per target.
//! 3. Buffers are flushed to all targets concurrently. Each adapter call gets
//!    the configured timeout once per change it carries.
//! 4. Each target's remote playlist is re-read and stored as its next
//!    baseline. If the re-read fails, the snapshot taken before the flush is
//!    stored instead. When part of a flush failed, the baseline is dated
//!    before the local playlist so the next round proposes the rest again.
//!
//! Failures are recorded in the [`SyncReport`]; nothing past this point
//! aborts the round.

use core_library::repositories::LocalPlaylistStore;
use core_library::PlaylistId;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::{
    batch_deadline, with_timeout, AdapterResult, BatchOutcome, RemotePlaylistAdapter,
};
use crate::plan::{bootstrap_plan, ChangeAction, ChangeSource, SyncChange, SyncPlan};
use crate::report::{SyncLogEntry, SyncReport, TargetLabel};
use crate::repository::{baseline_name, BaselineRepository};
use crate::snapshot::PlaylistSnapshot;

/// One target's share of a sync round.
pub struct TargetRun {
    pub label: TargetLabel,
    pub adapter: Arc<dyn RemotePlaylistAdapter>,
    /// Remote snapshot read before any change was applied
    pub remote: Option<PlaylistSnapshot>,
    pub plan: SyncPlan,
}

impl TargetRun {
    fn remote_name(&self) -> &str {
        &self.label.name
    }
}

/// Drop remote-sourced changes whose track an earlier plan already carries
/// as a remote-sourced change. Returns the number of dropped changes.
pub fn merge_target_plans<'a>(plans: impl IntoIterator<Item = &'a mut SyncPlan>) -> usize {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped = 0;

    for plan in plans {
        let mut claimed = HashSet::new();
        plan.changes.retain(|change| {
            if change.source != ChangeSource::Remote {
                return true;
            }
            let identity = change.item.identity_key();
            if seen.contains(&identity) {
                debug!(track = %change.item, "Dropping change already planned by an earlier target");
                dropped += 1;
                return false;
            }
            claimed.insert(identity);
            true
        });
        seen.extend(claimed);
    }

    dropped
}

#[derive(Debug, Default)]
struct PendingWrites {
    adds: Vec<SyncChange>,
    removes: Vec<SyncChange>,
}

impl PendingWrites {
    fn push(&mut self, change: &SyncChange) {
        match change.action {
            ChangeAction::Add => self.adds.push(change.clone()),
            ChangeAction::Remove => self.removes.push(change.clone()),
        }
    }

    fn items(changes: &[SyncChange]) -> Vec<core_library::PlaylistItem> {
        changes.iter().map(|change| change.item.clone()).collect()
    }
}

/// Executes plans against the local store and the remote adapters.
pub struct PlanExecutor {
    store: Arc<dyn LocalPlaylistStore>,
    baselines: Arc<dyn BaselineRepository>,
    adapter_timeout: Duration,
}

impl PlanExecutor {
    pub fn new(
        store: Arc<dyn LocalPlaylistStore>,
        baselines: Arc<dyn BaselineRepository>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            store,
            baselines,
            adapter_timeout,
        }
    }

    /// Merge, apply and flush the plans of one round.
    #[instrument(skip_all, fields(playlist_id = %playlist_id, targets = runs.len()))]
    pub async fn execute(
        &self,
        playlist_id: PlaylistId,
        local: &PlaylistSnapshot,
        mut runs: Vec<TargetRun>,
        report: &mut SyncReport,
    ) {
        let dropped = merge_target_plans(runs.iter_mut().map(|run| &mut run.plan));
        if dropped > 0 {
            info!(dropped, "Merged duplicate remote changes across targets");
        }

        let mut buffers = Vec::with_capacity(runs.len());
        for run in &runs {
            let mut pending = PendingWrites::default();
            for change in &run.plan.changes {
                match change.source {
                    ChangeSource::Remote => {
                        let entry = self.apply_locally(playlist_id, change, &run.label).await;
                        report.record(entry);
                    }
                    ChangeSource::Local => pending.push(change),
                }
            }
            buffers.push(pending);
        }

        let flushes = runs
            .iter()
            .zip(buffers)
            .map(|(run, pending)| self.flush_target(run, local, pending));

        for entries in join_all(flushes).await {
            report.entries.extend(entries);
        }
    }

    /// Replace every remote playlist's contents with the local snapshot.
    #[instrument(skip_all, fields(targets = runs.len()))]
    pub async fn force_push(
        &self,
        local: &PlaylistSnapshot,
        runs: Vec<TargetRun>,
        report: &mut SyncReport,
    ) {
        let pushes = runs.iter().map(|run| self.force_push_target(run, local));

        for entries in join_all(pushes).await {
            report.entries.extend(entries);
        }
    }

    async fn apply_locally(
        &self,
        playlist_id: PlaylistId,
        change: &SyncChange,
        label: &TargetLabel,
    ) -> SyncLogEntry {
        let entry = SyncLogEntry::for_change(change, label);
        let item = &change.item;

        match change.action {
            ChangeAction::Add => match self.store.add_music_file(playlist_id, item, true).await {
                Ok(Some(_)) => entry,
                Ok(None) => match self.store.add_requested_track(playlist_id, item).await {
                    Ok(_) => {
                        debug!(track = %item, "Added requested track placeholder");
                        entry
                    }
                    Err(e) => {
                        warn!(track = %item, error = %e, "Failed to add requested track");
                        entry.failed(e.to_string())
                    }
                },
                Err(e) => {
                    warn!(track = %item, error = %e, "Failed to add local entry");
                    entry.failed(e.to_string())
                }
            },
            ChangeAction::Remove => match self.store.remove_music_file(playlist_id, item).await {
                Ok(true) => entry,
                Ok(false) => {
                    warn!(track = %item, service = %label.service, "Unmatched removal left local playlist untouched");
                    entry.failed("no matching local entry")
                }
                Err(e) => {
                    warn!(track = %item, error = %e, "Failed to remove local entry");
                    entry.failed(e.to_string())
                }
            },
        }
    }

    #[instrument(skip_all, fields(service = %run.label.service, target = %run.label.name))]
    async fn flush_target(
        &self,
        run: &TargetRun,
        local: &PlaylistSnapshot,
        pending: PendingWrites,
    ) -> Vec<SyncLogEntry> {
        let name = run.remote_name();
        let mut entries = Vec::new();
        let mut flushed = false;
        let mut incomplete = false;

        if run.plan.creates_remote {
            let seed = PlaylistSnapshot::new(
                name,
                local.last_updated(),
                PendingWrites::items(&pending.adds),
            );
            let deadline = batch_deadline(self.adapter_timeout, seed.len());
            let result = with_timeout(deadline, run.adapter.create_playlist(name, &seed)).await;
            incomplete |= is_incomplete(&result);
            entries.extend(record_batch(&pending.adds, result, &run.label));
            flushed = true;
        } else {
            if !pending.removes.is_empty() {
                let items = PendingWrites::items(&pending.removes);
                let deadline = batch_deadline(self.adapter_timeout, items.len());
                let result = with_timeout(deadline, run.adapter.remove_items(name, &items)).await;
                incomplete |= is_incomplete(&result);
                entries.extend(record_batch(&pending.removes, result, &run.label));
                flushed = true;
            }
            if !pending.adds.is_empty() {
                let items = PendingWrites::items(&pending.adds);
                let deadline = batch_deadline(self.adapter_timeout, items.len());
                let result = with_timeout(deadline, run.adapter.add_items(name, &items)).await;
                incomplete |= is_incomplete(&result);
                entries.extend(record_batch(&pending.adds, result, &run.label));
                flushed = true;
            }
        }

        let failed = entries.iter().filter(|entry| !entry.success).count();
        info!(
            written = entries.len() - failed,
            failed,
            incomplete,
            "Flushed local changes to remote"
        );

        self.persist_baseline(run, local, flushed, incomplete).await;
        entries
    }

    #[instrument(skip_all, fields(service = %run.label.service, target = %run.label.name))]
    async fn force_push_target(&self, run: &TargetRun, local: &PlaylistSnapshot) -> Vec<SyncLogEntry> {
        let name = run.remote_name();
        let mut changes = bootstrap_plan(local).changes;
        for change in &mut changes {
            change.reason = "force push".to_string();
        }

        let result = match &run.remote {
            Some(remote) => {
                let clear_deadline = batch_deadline(self.adapter_timeout, remote.len());
                match with_timeout(clear_deadline, run.adapter.clear_playlist(name)).await {
                    Ok(()) => {
                        let deadline = batch_deadline(self.adapter_timeout, local.len());
                        with_timeout(deadline, run.adapter.add_items(name, local.items())).await
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                let seed = local.renamed(name);
                let deadline = batch_deadline(self.adapter_timeout, seed.len());
                with_timeout(deadline, run.adapter.create_playlist(name, &seed)).await
            }
        };

        let incomplete = is_incomplete(&result);
        let entries = record_batch(&changes, result, &run.label);
        info!(items = entries.len(), incomplete, "Force pushed local playlist");

        self.persist_baseline(run, local, true, incomplete).await;
        entries
    }

    /// Store the target's next baseline: the live remote playlist after a
    /// flush, else the snapshot read before it.
    ///
    /// An `incomplete` flush stores the image dated before `local`, so the
    /// local side still counts as changed next round.
    async fn persist_baseline(
        &self,
        run: &TargetRun,
        local: &PlaylistSnapshot,
        flushed: bool,
        incomplete: bool,
    ) {
        let name = run.remote_name();

        let snapshot = if flushed {
            match with_timeout(self.adapter_timeout, run.adapter.get_playlist_snapshot(name)).await {
                Ok(Some(fresh)) => Some(fresh),
                Ok(None) => {
                    warn!("Remote playlist missing after flush, keeping pre-flush baseline (degraded)");
                    run.remote.clone()
                }
                Err(e) => {
                    warn!(error = %e, "Re-read after flush failed, keeping pre-flush baseline (degraded)");
                    run.remote.clone()
                }
            }
        } else {
            run.remote.clone()
        };

        let Some(mut snapshot) = snapshot else {
            warn!("No remote image available, baseline left unchanged");
            return;
        };

        if incomplete {
            debug!("Flush incomplete, dating baseline before the local playlist");
            snapshot = snapshot.dated_before(local.last_updated());
        }

        let baseline = snapshot.renamed(baseline_name(run.label.service, name));
        if let Err(e) = self.baselines.write_snapshot(&baseline).await {
            error!(error = %e, "Failed to persist baseline");
        }
    }
}

/// Whether some change of a call should be attempted again next round.
fn is_incomplete(result: &AdapterResult<BatchOutcome>) -> bool {
    match result {
        Ok(outcome) => outcome.has_failures(),
        Err(_) => true,
    }
}

/// One log entry per change, from the outcome of the call that carried them.
fn record_batch(
    changes: &[SyncChange],
    result: AdapterResult<BatchOutcome>,
    label: &TargetLabel,
) -> Vec<SyncLogEntry> {
    let same_track = |item: &core_library::PlaylistItem, change: &SyncChange| {
        item == &change.item || item.identity_key() == change.item.identity_key()
    };

    match result {
        Ok(outcome) => changes
            .iter()
            .map(|change| {
                let entry = SyncLogEntry::for_change(change, label);
                if let Some(failure) = outcome
                    .failed
                    .iter()
                    .find(|failure| same_track(&failure.item, change))
                {
                    entry.failed(failure.error.to_string())
                } else if outcome.skipped.iter().any(|item| same_track(item, change)) {
                    entry.failed(format!("skipped: not found on {}", label.service))
                } else {
                    entry
                }
            })
            .collect(),
        Err(e) => {
            warn!(service = %label.service, error = %e, changes = changes.len(), "Adapter call failed");
            changes
                .iter()
                .map(|change| SyncLogEntry::for_change(change, label).failed(e.to_string()))
                .collect()
        }
    }
}
