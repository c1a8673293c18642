//! # Sync Plan Builder
//!
//! Three-way comparison of the baseline (remote state after the last
//! round), the current remote snapshot and the local snapshot.
//!
//! ## Rules
//!
//! | Baseline | Remote | Plan |
//! |----------|--------|------|
//! | any | absent | bootstrap: every local item is added remotely |
//! | absent | present | union: missing items are added on each side, never removed |
//! | present | present | each side that changed since the baseline contributes its adds and removals |
//!
//! A side "changed" when its `last_updated` is later than the baseline's.
//! Both sides are diffed independently; there is no three-way merge beyond
//! the existence checks below.
//!
//! Local-sourced changes come first, then remote-sourced ones, each in
//! snapshot order.

use core_library::PlaylistItem;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::PlaylistSnapshot;
use crate::target::SyncFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Remove,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Remove => "remove",
        }
    }
}

/// Side a change was observed on. Local-sourced changes are applied to the
/// remote playlist and remote-sourced ones to the local playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Local,
    Remote,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Local => "local",
            ChangeSource::Remote => "remote",
        }
    }
}

/// One proposed add or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncChange {
    pub action: ChangeAction,
    pub item: PlaylistItem,
    pub source: ChangeSource,
    pub reason: String,
}

impl SyncChange {
    pub fn new(
        action: ChangeAction,
        item: PlaylistItem,
        source: ChangeSource,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            item,
            source,
            reason: reason.into(),
        }
    }

    pub fn is_remote_removal(&self) -> bool {
        self.action == ChangeAction::Remove && self.source == ChangeSource::Remote
    }
}

impl fmt::Display for SyncChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {})",
            self.action.as_str(),
            self.item,
            self.source.as_str()
        )
    }
}

/// Ordered changes for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub changes: Vec<SyncChange>,
    /// The remote playlist does not exist and will be created from the
    /// local-sourced adds
    pub creates_remote: bool,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn local_sourced(&self) -> impl Iterator<Item = &SyncChange> {
        self.changes.iter().filter(|c| c.source == ChangeSource::Local)
    }

    pub fn remote_sourced(&self) -> impl Iterator<Item = &SyncChange> {
        self.changes.iter().filter(|c| c.source == ChangeSource::Remote)
    }

    pub fn remote_removal_count(&self) -> usize {
        self.changes.iter().filter(|c| c.is_remote_removal()).count()
    }
}

/// Build the plan for one target.
pub fn build_plan(
    baseline: Option<&PlaylistSnapshot>,
    remote: Option<&PlaylistSnapshot>,
    local: &PlaylistSnapshot,
    flags: SyncFlags,
) -> SyncPlan {
    let Some(remote) = remote else {
        return bootstrap_plan(local);
    };

    let mut local_sourced = Vec::new();
    let mut remote_sourced = Vec::new();

    match baseline {
        None => {
            if flags.send_entry_adds {
                local_sourced.extend(
                    missing_from(local, remote)
                        .map(|item| add(item, ChangeSource::Local, "not yet on remote")),
                );
            }
            if flags.receive_entry_adds {
                remote_sourced.extend(
                    missing_from(remote, local)
                        .map(|item| add(item, ChangeSource::Remote, "not yet in local playlist")),
                );
            }
        }
        Some(baseline) => {
            let local_changed = local.last_updated() > baseline.last_updated();
            let remote_changed = remote.last_updated() > baseline.last_updated();

            if local_changed {
                if flags.send_entry_adds {
                    local_sourced.extend(
                        missing_from(local, baseline)
                            .filter(|item| !remote.has(item))
                            .map(|item| add(item, ChangeSource::Local, "added locally")),
                    );
                }
                if flags.send_entry_removals {
                    local_sourced.extend(
                        missing_from(baseline, local)
                            .filter(|item| remote.has(item))
                            .map(|item| remove(remote, item, ChangeSource::Local, "removed locally")),
                    );
                }
            }

            if remote_changed {
                if flags.receive_entry_adds {
                    remote_sourced.extend(
                        missing_from(remote, baseline)
                            .filter(|item| !local.has(item))
                            .map(|item| add(item, ChangeSource::Remote, "added remotely")),
                    );
                }
                if flags.receive_entry_removals {
                    remote_sourced.extend(
                        missing_from(baseline, remote)
                            .filter(|item| local.has(item))
                            .map(|item| remove(local, item, ChangeSource::Remote, "removed remotely")),
                    );
                }
            }
        }
    }

    local_sourced.extend(remote_sourced);
    SyncPlan {
        changes: local_sourced,
        creates_remote: false,
    }
}

/// Plan that creates the remote playlist from the local snapshot.
pub fn bootstrap_plan(local: &PlaylistSnapshot) -> SyncPlan {
    SyncPlan {
        changes: local
            .items()
            .iter()
            .map(|item| add(item, ChangeSource::Local, "remote playlist missing"))
            .collect(),
        creates_remote: true,
    }
}

/// Items of `from` that `other` does not have, in `from`'s order.
fn missing_from<'a>(
    from: &'a PlaylistSnapshot,
    other: &'a PlaylistSnapshot,
) -> impl Iterator<Item = &'a PlaylistItem> {
    from.items().iter().filter(move |item| !other.has(item))
}

fn add(item: &PlaylistItem, source: ChangeSource, reason: &str) -> SyncChange {
    SyncChange::new(ChangeAction::Add, item.clone(), source, reason)
}

/// A removal targets the side that still holds the item, so carry that
/// side's copy with its identity keys filled in.
fn remove(
    holder: &PlaylistSnapshot,
    item: &PlaylistItem,
    source: ChangeSource,
    reason: &str,
) -> SyncChange {
    let mut target = holder.search_track(item).cloned().unwrap_or_else(|| item.clone());
    target.merge_identity_keys(item);
    SyncChange::new(ChangeAction::Remove, target, source, reason)
}
