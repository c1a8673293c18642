//! # Playlist Sync Engine
//!
//! Keeps a local playlist and its remote mirrors on Plex, Spotify and
//! YouTube converging.
//!
//! ## Overview
//!
//! Each round compares three snapshots per target: the baseline stored
//! after the previous round, the live remote playlist and the local
//! playlist. Changes observed on one side are replayed on the other.
//!
//! ## Components
//!
//! - **Snapshots** (`snapshot`): Immutable, identity-indexed playlist images
//! - **Adapters** (`adapter`): Service-agnostic remote playlist operations and their registry
//! - **Planner** (`plan`): Three-way plan construction per target
//! - **Guardrail** (`guardrail`): Suppression of bulk remote-driven removals
//! - **Executor** (`executor`): Batched, concurrent application of plans
//! - **Repository** (`repository`): Baselines, sync targets and the sync log
//! - **Sync Coordinator** (`coordinator`): One locked round per playlist

pub mod adapter;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod guardrail;
pub mod plan;
pub mod report;
pub mod repository;
pub mod snapshot;
pub mod target;

pub use adapter::{
    batch_deadline, pick_candidate, with_timeout, AdapterError, AdapterFactory, AdapterRegistry,
    AdapterResult, BatchOutcome, ItemFailure, RemotePlaylistAdapter, Resolution,
};
pub use coordinator::SyncCoordinator;
pub use error::{Result, SyncError};
pub use executor::{merge_target_plans, PlanExecutor, TargetRun};
pub use guardrail::{apply_guardrail, GuardrailConfig, GuardrailOutcome};
pub use plan::{build_plan, ChangeAction, ChangeSource, SyncChange, SyncPlan};
pub use report::{
    GuardrailBlock, SyncLogEntry, SyncOutcome, SyncReport, SyncRoundId, SyncSummary,
    TargetFailure, TargetLabel,
};
pub use repository::{
    BaselineRepository, SqliteBaselineRepository, SqliteSyncLogRepository,
    SqliteSyncTargetRepository, StoredLogEntry, SyncLogRepository, SyncTargetRepository,
};
pub use snapshot::PlaylistSnapshot;
pub use target::{NewSyncTarget, SyncFlags, SyncTarget, SyncTargetId, TargetConfig};
