//! # Removal Guardrail
//!
//! Suppresses bulk deletions of local entries driven by a remote playlist
//! that suddenly lost most of its items, such as a playlist wiped on the
//! service's side.
//!
//! Only remote-sourced removals are inspected. If there are more than
//! `max_receive_removal_count` of them, or they make up more than
//! `max_receive_removal_percent` of the local playlist, all of them are
//! stripped from the plan. Small playlists (below
//! `min_local_size_for_removal_guard`) are never guarded.

use serde_json::{Map, Value};
use tracing::warn;

use crate::plan::SyncPlan;

pub const DEFAULT_MAX_RECEIVE_REMOVAL_PERCENT: f64 = 0.30;
pub const DEFAULT_MAX_RECEIVE_REMOVAL_COUNT: usize = 25;
pub const DEFAULT_MIN_LOCAL_SIZE_FOR_REMOVAL_GUARD: usize = 10;

/// Guardrail thresholds for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailConfig {
    pub allow_bulk_receive_removals: bool,
    pub max_receive_removal_percent: f64,
    pub max_receive_removal_count: usize,
    pub min_local_size_for_removal_guard: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            allow_bulk_receive_removals: false,
            max_receive_removal_percent: DEFAULT_MAX_RECEIVE_REMOVAL_PERCENT,
            max_receive_removal_count: DEFAULT_MAX_RECEIVE_REMOVAL_COUNT,
            min_local_size_for_removal_guard: DEFAULT_MIN_LOCAL_SIZE_FOR_REMOVAL_GUARD,
        }
    }
}

impl GuardrailConfig {
    /// Read overrides from a target's settings map.
    ///
    /// Only the JSON boolean `true` enables `allow_bulk_receive_removals`;
    /// strings such as `"true"` or `"false"` leave the guard on. Numeric
    /// settings of the wrong type fall back to the defaults.
    ///
    /// ```
    /// use core_sync::guardrail::GuardrailConfig;
    /// use serde_json::json;
    ///
    /// let settings = json!({ "allow_bulk_receive_removals": "true" });
    /// let config = GuardrailConfig::from_settings(settings.as_object().unwrap());
    /// assert!(!config.allow_bulk_receive_removals);
    /// ```
    pub fn from_settings(settings: &Map<String, Value>) -> Self {
        let defaults = Self::default();

        Self {
            allow_bulk_receive_removals: matches!(
                settings.get("allow_bulk_receive_removals"),
                Some(Value::Bool(true))
            ),
            max_receive_removal_percent: settings
                .get("max_receive_removal_percent")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.max_receive_removal_percent),
            max_receive_removal_count: settings
                .get("max_receive_removal_count")
                .and_then(Value::as_u64)
                .map(|count| count as usize)
                .unwrap_or(defaults.max_receive_removal_count),
            min_local_size_for_removal_guard: settings
                .get("min_local_size_for_removal_guard")
                .and_then(Value::as_u64)
                .map(|size| size as usize)
                .unwrap_or(defaults.min_local_size_for_removal_guard),
        }
    }
}

/// What the guardrail did to a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailOutcome {
    Passed,
    Blocked {
        removals: usize,
        local_size: usize,
        ratio: f64,
    },
}

impl GuardrailOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GuardrailOutcome::Blocked { .. })
    }
}

/// Filter a plan against the guardrail for a local playlist of
/// `local_size` items.
pub fn apply_guardrail(
    mut plan: SyncPlan,
    local_size: usize,
    config: &GuardrailConfig,
) -> (SyncPlan, GuardrailOutcome) {
    if config.allow_bulk_receive_removals || local_size < config.min_local_size_for_removal_guard {
        return (plan, GuardrailOutcome::Passed);
    }

    let removals = plan.remote_removal_count();
    if removals == 0 {
        return (plan, GuardrailOutcome::Passed);
    }

    let ratio = removals as f64 / local_size as f64;
    if removals > config.max_receive_removal_count || ratio > config.max_receive_removal_percent {
        warn!(
            removals,
            local_size,
            ratio,
            max_count = config.max_receive_removal_count,
            max_percent = config.max_receive_removal_percent,
            "Guardrail blocked remote-driven removals"
        );
        plan.changes.retain(|change| !change.is_remote_removal());
        return (
            plan,
            GuardrailOutcome::Blocked {
                removals,
                local_size,
                ratio,
            },
        );
    }

    (plan, GuardrailOutcome::Passed)
}
