//! # Sync Repositories
//!
//! Database persistence for the sync engine's own state:
//! - baselines (the remote image after the last round, per target)
//! - sync target configuration
//! - the per-change sync log

use async_trait::async_trait;
use chrono::DateTime;
use core_auth::ServiceKind;
use core_library::{PlaylistId, PlaylistItem};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::report::{SyncLogEntry, SyncRoundId};
use crate::snapshot::PlaylistSnapshot;
use crate::target::{NewSyncTarget, SyncFlags, SyncTarget, SyncTargetId, TargetConfig};
use crate::{Result, SyncError};

/// Truncate a baseline name to `max_len` characters.
pub fn baseline_key(name: &str, max_len: usize) -> String {
    name.chars().take(max_len).collect()
}

/// Baseline name for a target's remote playlist.
pub fn baseline_name(service: ServiceKind, remote_name: &str) -> String {
    format!("{}:{}", service.as_str(), remote_name)
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Persisted baselines keyed by (truncated) name.
#[async_trait]
pub trait BaselineRepository: Send + Sync {
    /// Baseline stored under `name`, if any.
    async fn get_current_snapshot(&self, name: &str) -> Result<Option<PlaylistSnapshot>>;

    /// Store `snapshot` under its name, replacing any previous baseline.
    async fn write_snapshot(&self, snapshot: &PlaylistSnapshot) -> Result<()>;
}

/// Sync target configuration. Targets are managed outside the engine;
/// `insert` exists for seeding.
#[async_trait]
pub trait SyncTargetRepository: Send + Sync {
    /// Every target of a playlist, enabled or not, in insertion order.
    async fn targets_for_playlist(&self, playlist_id: PlaylistId) -> Result<Vec<SyncTarget>>;

    async fn insert(&self, target: &NewSyncTarget) -> Result<SyncTarget>;
}

/// A stored sync log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLogEntry {
    pub round_id: String,
    pub playlist_id: PlaylistId,
    pub entry: SyncLogEntry,
    pub created_at: i64,
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    /// Append the entries of one round.
    async fn record(
        &self,
        round_id: SyncRoundId,
        playlist_id: PlaylistId,
        entries: &[SyncLogEntry],
        created_at: i64,
    ) -> Result<()>;

    /// Most recent entries for a playlist, newest first.
    async fn recent(&self, playlist_id: PlaylistId, limit: u32) -> Result<Vec<StoredLogEntry>>;

    /// Entries of one round in recording order.
    async fn for_round(&self, round_id: SyncRoundId) -> Result<Vec<StoredLogEntry>>;
}

// ============================================================================
// SQLite Implementations
// ============================================================================

/// SQLite implementation of [`BaselineRepository`]
pub struct SqliteBaselineRepository {
    pool: SqlitePool,
    max_name_len: usize,
}

impl SqliteBaselineRepository {
    pub fn new(pool: SqlitePool, max_name_len: usize) -> Self {
        Self { pool, max_name_len }
    }
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    name: String,
    last_updated: i64,
    items: String,
}

#[async_trait]
impl BaselineRepository for SqliteBaselineRepository {
    async fn get_current_snapshot(&self, name: &str) -> Result<Option<PlaylistSnapshot>> {
        let key = baseline_key(name, self.max_name_len);
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT name, last_updated, items FROM playlist_snapshots WHERE name = ?",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<PlaylistItem> = serde_json::from_str(&row.items)?;
        let last_updated = DateTime::from_timestamp_millis(row.last_updated).ok_or_else(|| {
            SyncError::Database(format!("invalid last_updated for baseline {}", row.name))
        })?;

        Ok(Some(PlaylistSnapshot::new(row.name, last_updated, items)))
    }

    async fn write_snapshot(&self, snapshot: &PlaylistSnapshot) -> Result<()> {
        let key = baseline_key(snapshot.name(), self.max_name_len);
        let items = serde_json::to_string(snapshot.items())?;
        let now = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO playlist_snapshots (name, last_updated, items, written_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                last_updated = excluded.last_updated,
                items = excluded.items,
                written_at = excluded.written_at
            "#,
        )
        .bind(&key)
        .bind(snapshot.last_updated().timestamp_millis())
        .bind(items)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(baseline = %key, items = snapshot.len(), "Baseline written");
        Ok(())
    }
}

/// SQLite implementation of [`SyncTargetRepository`]
pub struct SqliteSyncTargetRepository {
    pool: SqlitePool,
}

impl SqliteSyncTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync target
#[derive(Debug, FromRow)]
struct SyncTargetRow {
    id: i64,
    playlist_id: i64,
    service: String,
    config: String,
    enabled: bool,
    send_entry_adds: bool,
    send_entry_removals: bool,
    receive_entry_adds: bool,
    receive_entry_removals: bool,
}

impl TryFrom<SyncTargetRow> for SyncTarget {
    type Error = SyncError;

    fn try_from(row: SyncTargetRow) -> Result<Self> {
        let service: ServiceKind = row
            .service
            .parse()
            .map_err(|_| SyncError::InvalidTarget(format!("unknown service: {}", row.service)))?;
        let config: TargetConfig = serde_json::from_str(&row.config)?;

        Ok(SyncTarget {
            id: SyncTargetId(row.id),
            playlist_id: PlaylistId(row.playlist_id),
            service,
            config,
            enabled: row.enabled,
            flags: SyncFlags {
                send_entry_adds: row.send_entry_adds,
                send_entry_removals: row.send_entry_removals,
                receive_entry_adds: row.receive_entry_adds,
                receive_entry_removals: row.receive_entry_removals,
            },
        })
    }
}

#[async_trait]
impl SyncTargetRepository for SqliteSyncTargetRepository {
    async fn targets_for_playlist(&self, playlist_id: PlaylistId) -> Result<Vec<SyncTarget>> {
        let rows = sqlx::query_as::<_, SyncTargetRow>(
            r#"
            SELECT id, playlist_id, service, config, enabled,
                   send_entry_adds, send_entry_removals,
                   receive_entry_adds, receive_entry_removals
            FROM sync_targets
            WHERE playlist_id = ?
            ORDER BY id
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncTarget::try_from).collect()
    }

    async fn insert(&self, target: &NewSyncTarget) -> Result<SyncTarget> {
        let config = serde_json::to_string(&target.config)?;
        let result = sqlx::query(
            r#"
            INSERT INTO sync_targets (
                playlist_id, service, config, enabled,
                send_entry_adds, send_entry_removals,
                receive_entry_adds, receive_entry_removals, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(target.playlist_id)
        .bind(target.service.as_str())
        .bind(config)
        .bind(target.enabled)
        .bind(target.flags.send_entry_adds)
        .bind(target.flags.send_entry_removals)
        .bind(target.flags.receive_entry_adds)
        .bind(target.flags.receive_entry_removals)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(SyncTarget {
            id: SyncTargetId(result.last_insert_rowid()),
            playlist_id: target.playlist_id,
            service: target.service,
            config: target.config.clone(),
            enabled: target.enabled,
            flags: target.flags,
        })
    }
}

/// SQLite implementation of [`SyncLogRepository`]
pub struct SqliteSyncLogRepository {
    pool: SqlitePool,
}

impl SqliteSyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncLogRow {
    round_id: String,
    playlist_id: i64,
    target_id: Option<i64>,
    service: String,
    target_name: String,
    action: String,
    source: Option<String>,
    track: String,
    reason: String,
    success: bool,
    error: Option<String>,
    created_at: i64,
}

impl TryFrom<SyncLogRow> for StoredLogEntry {
    type Error = SyncError;

    fn try_from(row: SyncLogRow) -> Result<Self> {
        let service: ServiceKind = row
            .service
            .parse()
            .map_err(|_| SyncError::Database(format!("invalid service in sync log: {}", row.service)))?;
        let action = serde_json::from_value(serde_json::Value::String(row.action))?;
        let source = row
            .source
            .map(|source| serde_json::from_value(serde_json::Value::String(source)))
            .transpose()?;

        Ok(StoredLogEntry {
            round_id: row.round_id,
            playlist_id: PlaylistId(row.playlist_id),
            entry: SyncLogEntry {
                action,
                track: row.track,
                service,
                target_name: row.target_name,
                target_id: row.target_id.map(SyncTargetId),
                source,
                reason: row.reason,
                success: row.success,
                error: row.error,
            },
            created_at: row.created_at,
        })
    }
}

const SYNC_LOG_COLUMNS: &str = r#"
    round_id, playlist_id, target_id, service, target_name, action, source,
    track, reason, success, error, created_at
"#;

#[async_trait]
impl SyncLogRepository for SqliteSyncLogRepository {
    async fn record(
        &self,
        round_id: SyncRoundId,
        playlist_id: PlaylistId,
        entries: &[SyncLogEntry],
        created_at: i64,
    ) -> Result<()> {
        let round = round_id.to_string();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO sync_log_entries (
                    round_id, playlist_id, target_id, service, target_name, action,
                    source, track, reason, success, error, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&round)
            .bind(playlist_id)
            .bind(entry.target_id)
            .bind(entry.service.as_str())
            .bind(&entry.target_name)
            .bind(entry.action.as_str())
            .bind(entry.source.map(|source| source.as_str()))
            .bind(&entry.track)
            .bind(&entry.reason)
            .bind(entry.success)
            .bind(&entry.error)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent(&self, playlist_id: PlaylistId, limit: u32) -> Result<Vec<StoredLogEntry>> {
        let sql = format!(
            "SELECT {} FROM sync_log_entries WHERE playlist_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            SYNC_LOG_COLUMNS
        );
        let rows = sqlx::query_as::<_, SyncLogRow>(&sql)
            .bind(playlist_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredLogEntry::try_from).collect()
    }

    async fn for_round(&self, round_id: SyncRoundId) -> Result<Vec<StoredLogEntry>> {
        let sql = format!(
            "SELECT {} FROM sync_log_entries WHERE round_id = ? ORDER BY id",
            SYNC_LOG_COLUMNS
        );
        let rows = sqlx::query_as::<_, SyncLogRow>(&sql)
            .bind(round_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredLogEntry::try_from).collect()
    }
}
