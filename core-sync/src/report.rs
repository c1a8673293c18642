//! Sync round report

use chrono::{DateTime, Utc};
use core_auth::ServiceKind;
use core_library::{PlaylistId, PlaylistItem};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::plan::{ChangeAction, ChangeSource, SyncChange};
use crate::target::SyncTargetId;

/// Identifier of one sync invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRoundId(pub Uuid);

impl SyncRoundId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attempted change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub action: ChangeAction,
    /// "artist - title" of the track
    pub track: String,
    pub service: ServiceKind,
    pub target_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<SyncTargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ChangeSource>,
    pub reason: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncLogEntry {
    pub fn for_change(change: &SyncChange, target: &TargetLabel) -> Self {
        Self::for_item(change.action, &change.item, target, &change.reason).with_source(change.source)
    }

    pub fn for_item(
        action: ChangeAction,
        item: &PlaylistItem,
        target: &TargetLabel,
        reason: &str,
    ) -> Self {
        Self {
            action,
            track: item.to_string(),
            service: target.service,
            target_name: target.name.clone(),
            target_id: target.id,
            source: None,
            reason: reason.to_string(),
            success: true,
            error: None,
        }
    }

    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// The target a log entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLabel {
    pub id: Option<SyncTargetId>,
    pub service: ServiceKind,
    /// Remote playlist name
    pub name: String,
}

/// A target that could not take part in the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub service: ServiceKind,
    pub target_name: String,
    pub error: String,
}

/// Remote-driven removals the guardrail suppressed for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailBlock {
    pub service: ServiceKind,
    pub target_name: String,
    pub removals: usize,
    pub local_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
    pub total: usize,
    pub failed_targets: usize,
    pub outcome: SyncOutcome,
    /// Entries that landed, in report order
    pub synced_entries: Vec<SyncLogEntry>,
    /// Entries that did not land, each with its error
    pub failed_entries: Vec<SyncLogEntry>,
}

/// Everything one sync invocation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub round_id: SyncRoundId,
    pub playlist_id: PlaylistId,
    pub started_at: DateTime<Utc>,
    pub force_push: bool,
    pub entries: Vec<SyncLogEntry>,
    pub target_failures: Vec<TargetFailure>,
    pub guardrail_blocks: Vec<GuardrailBlock>,
}

impl SyncReport {
    pub fn new(playlist_id: PlaylistId, started_at: DateTime<Utc>, force_push: bool) -> Self {
        Self {
            round_id: SyncRoundId::new(),
            playlist_id,
            started_at,
            force_push,
            entries: Vec::new(),
            target_failures: Vec::new(),
            guardrail_blocks: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: SyncLogEntry) {
        self.entries.push(entry);
    }

    pub fn record_target_failure(&mut self, target: &TargetLabel, error: impl Into<String>) {
        self.target_failures.push(TargetFailure {
            service: target.service,
            target_name: target.name.clone(),
            error: error.into(),
        });
    }

    /// Recorded entries split by result, with their counts. Any failed entry
    /// or failed target makes the round partial.
    pub fn summary(&self) -> SyncSummary {
        let (synced_entries, failed_entries): (Vec<_>, Vec<_>) =
            self.entries.iter().cloned().partition(|entry| entry.success);
        let outcome = if failed_entries.is_empty() && self.target_failures.is_empty() {
            SyncOutcome::Success
        } else {
            SyncOutcome::Partial
        };

        SyncSummary {
            synced: synced_entries.len(),
            failed: failed_entries.len(),
            total: self.entries.len(),
            failed_targets: self.target_failures.len(),
            outcome,
            synced_entries,
            failed_entries,
        }
    }
}
