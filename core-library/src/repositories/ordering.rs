//! # Sparse Entry Ordering
//!
//! Playlist entries carry an integer `entry_order` key. Keys are strictly
//! increasing in list order but deliberately leave gaps, so inserting an
//! entry only writes that entry's row:
//!
//! - append: `last + step`, or `step` for an empty playlist
//! - between two keys: the integer midpoint
//! - before the head: `head - step`
//!
//! When a midpoint collides with one of its bounds the gap is exhausted. The
//! playlist is then renumbered to `index * step` (`0, step, 2 * step, ...`)
//! in its current order and the insertion is retried once.
//!
//! Every public mutation on [`SqliteEntryOrdering`] runs inside a single
//! database transaction.

use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{LibraryError, Result};
use crate::models::{EntryId, EntryTarget, PlaylistEntry, PlaylistId};

/// Key arithmetic for sparse ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseOrdering {
    step: i64,
}

impl SparseOrdering {
    pub fn new(step: i64) -> Self {
        Self { step: step.max(2) }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Key for a new last entry.
    pub fn append_key(&self, last: Option<i64>) -> i64 {
        match last {
            Some(last) => last + self.step,
            None => self.step,
        }
    }

    /// Key strictly between `before` and `after`, or `None` if the gap is
    /// exhausted.
    ///
    /// ```
    /// use core_library::repositories::SparseOrdering;
    ///
    /// let ordering = SparseOrdering::new(100);
    /// assert_eq!(ordering.key_between(Some(100), Some(200)), Some(150));
    /// assert_eq!(ordering.key_between(Some(150), Some(151)), None);
    /// assert_eq!(ordering.key_between(None, Some(100)), Some(0));
    /// ```
    pub fn key_between(&self, before: Option<i64>, after: Option<i64>) -> Option<i64> {
        match (before, after) {
            (None, None) => Some(self.step),
            (Some(before), None) => Some(before + self.step),
            (None, Some(after)) => Some(after - self.step),
            (Some(before), Some(after)) => {
                let midpoint = before + (after - before) / 2;
                if midpoint == before || midpoint == after {
                    None
                } else {
                    Some(midpoint)
                }
            }
        }
    }

    /// Key of the entry at `index` after a rebalance.
    pub fn rebalanced_key(&self, index: usize) -> i64 {
        index as i64 * self.step
    }
}

impl Default for SparseOrdering {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Result of a positional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub entry_id: EntryId,
    pub order: i64,
    /// Whether the playlist had to be renumbered first
    pub rebalanced: bool,
}

/// Ordered entry access for one playlist at a time.
#[async_trait]
pub trait EntryOrdering: Send + Sync {
    /// Entries of a playlist in list order.
    async fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>>;

    /// Append an entry to the end of the playlist.
    async fn append(&self, playlist_id: PlaylistId, target: EntryTarget) -> Result<InsertOutcome>;

    /// Insert an entry so it ends up at `position` (clamped to the list length).
    async fn insert_at(
        &self,
        playlist_id: PlaylistId,
        position: usize,
        target: EntryTarget,
    ) -> Result<InsertOutcome>;

    /// Renumber the playlist to evenly spaced keys. Returns the entry count.
    async fn rebalance(&self, playlist_id: PlaylistId) -> Result<usize>;

    /// Move the entries at `indices` so the first of them lands at `to`.
    ///
    /// The moved entries keep their relative order. Returns the resulting
    /// entry list.
    async fn reorder(
        &self,
        playlist_id: PlaylistId,
        indices: &[usize],
        to: usize,
    ) -> Result<Vec<PlaylistEntry>>;

    /// Delete one entry.
    async fn remove(&self, playlist_id: PlaylistId, entry_id: EntryId) -> Result<bool>;
}

/// SQLite implementation of [`EntryOrdering`]
pub struct SqliteEntryOrdering {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    ordering: SparseOrdering,
}

impl SqliteEntryOrdering {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, step: i64) -> Self {
        Self {
            pool,
            clock,
            ordering: SparseOrdering::new(step),
        }
    }
}

#[async_trait]
impl EntryOrdering for SqliteEntryOrdering {
    async fn entries(&self, playlist_id: PlaylistId) -> Result<Vec<PlaylistEntry>> {
        let mut conn = self.pool.acquire().await?;
        load_entries(&mut conn, playlist_id).await
    }

    #[instrument(skip(self), fields(playlist_id = %playlist_id))]
    async fn append(&self, playlist_id: PlaylistId, target: EntryTarget) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        let (entry_id, order) = append_entry(&mut tx, playlist_id, target, self.ordering).await?;
        tx.commit().await?;

        Ok(InsertOutcome {
            entry_id,
            order,
            rebalanced: false,
        })
    }

    #[instrument(skip(self), fields(playlist_id = %playlist_id))]
    async fn insert_at(
        &self,
        playlist_id: PlaylistId,
        position: usize,
        target: EntryTarget,
    ) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        let outcome =
            insert_entry_at(&mut tx, playlist_id, position, target, self.ordering).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn rebalance(&self, playlist_id: PlaylistId) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let entries = rebalance_entries(&mut tx, playlist_id, self.ordering).await?;
        tx.commit().await?;

        Ok(entries.len())
    }

    #[instrument(skip(self, indices), fields(playlist_id = %playlist_id, count = indices.len()))]
    async fn reorder(
        &self,
        playlist_id: PlaylistId,
        indices: &[usize],
        to: usize,
    ) -> Result<Vec<PlaylistEntry>> {
        let mut tx = self.pool.begin().await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;

        let entries = load_entries(&mut tx, playlist_id).await?;
        if let Some(bad) = indices.iter().find(|&&index| index >= entries.len()) {
            return Err(LibraryError::invalid_input(
                "indices",
                format!("index {} out of range for {} entries", bad, entries.len()),
            ));
        }

        let moving: Vec<&PlaylistEntry> = entries
            .iter()
            .enumerate()
            .filter(|(index, _)| indices.contains(index))
            .map(|(_, entry)| entry)
            .collect();

        for entry in &moving {
            delete_entry(&mut tx, entry.id).await?;
        }

        let remaining = entries.len() - moving.len();
        let start = to.min(remaining);
        for (offset, entry) in moving.iter().enumerate() {
            let target = entry.target().ok_or_else(|| corrupt_entry(entry.id))?;
            insert_entry_at(&mut tx, playlist_id, start + offset, target, self.ordering).await?;
        }

        let reordered = load_entries(&mut tx, playlist_id).await?;
        tx.commit().await?;

        debug!(moved = moving.len(), to = start, "Reordered playlist entries");
        Ok(reordered)
    }

    async fn remove(&self, playlist_id: PlaylistId, entry_id: EntryId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM playlist_entries WHERE id = ? AND playlist_id = ?")
            .bind(entry_id)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if removed {
            touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        }
        tx.commit().await?;

        Ok(removed)
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

fn corrupt_entry(id: EntryId) -> LibraryError {
    LibraryError::CorruptRow {
        table: "playlist_entries".to_string(),
        message: format!("entry {} has no reference matching its kind", id),
    }
}

/// Entries of a playlist in list order.
pub(crate) async fn load_entries(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
) -> Result<Vec<PlaylistEntry>> {
    let entries = sqlx::query_as::<_, PlaylistEntry>(
        r#"
        SELECT id, playlist_id, entry_order, kind, music_file_id, requested_track_id,
               album_id, nested_playlist_id
        FROM playlist_entries
        WHERE playlist_id = ?
        ORDER BY entry_order, id
        "#,
    )
    .bind(playlist_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}

/// Set the playlist's change timestamp. Fails with `NotFound` for an unknown
/// playlist.
pub(crate) async fn touch_playlist(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
    now_millis: i64,
) -> Result<()> {
    let result = sqlx::query("UPDATE playlists SET updated_at = MAX(updated_at + 1, ?) WHERE id = ?")
        .bind(now_millis)
        .bind(playlist_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(LibraryError::not_found("Playlist", playlist_id));
    }
    Ok(())
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
    order: i64,
    target: EntryTarget,
) -> Result<EntryId> {
    let (music_file_id, requested_track_id, album_id, nested_playlist_id) = match target {
        EntryTarget::MusicFile(id) => (Some(id), None, None, None),
        EntryTarget::RequestedTrack(id) => (None, Some(id), None, None),
        EntryTarget::Album(id) => (None, None, Some(id), None),
        EntryTarget::NestedPlaylist(id) => (None, None, None, Some(id)),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO playlist_entries (
            playlist_id, entry_order, kind, music_file_id, requested_track_id,
            album_id, nested_playlist_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(playlist_id)
    .bind(order)
    .bind(target.kind())
    .bind(music_file_id)
    .bind(requested_track_id)
    .bind(album_id)
    .bind(nested_playlist_id)
    .execute(&mut *conn)
    .await?;

    Ok(EntryId(result.last_insert_rowid()))
}

async fn delete_entry(conn: &mut SqliteConnection, entry_id: EntryId) -> Result<()> {
    sqlx::query("DELETE FROM playlist_entries WHERE id = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Append an entry at `last + step`.
pub(crate) async fn append_entry(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
    target: EntryTarget,
    ordering: SparseOrdering,
) -> Result<(EntryId, i64)> {
    let (last,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(entry_order) FROM playlist_entries WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(&mut *conn)
            .await?;

    let order = ordering.append_key(last);
    let entry_id = insert_entry(conn, playlist_id, order, target).await?;
    Ok((entry_id, order))
}

/// Renumber every entry to `index * step`, keeping list order.
pub(crate) async fn rebalance_entries(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
    ordering: SparseOrdering,
) -> Result<Vec<PlaylistEntry>> {
    let mut entries = load_entries(conn, playlist_id).await?;

    for (index, entry) in entries.iter_mut().enumerate() {
        let order = ordering.rebalanced_key(index);
        if entry.entry_order != order {
            sqlx::query("UPDATE playlist_entries SET entry_order = ? WHERE id = ?")
                .bind(order)
                .bind(entry.id)
                .execute(&mut *conn)
                .await?;
            entry.entry_order = order;
        }
    }

    debug!(playlist_id = %playlist_id, entries = entries.len(), "Rebalanced playlist order keys");
    Ok(entries)
}

/// Insert so the new entry ends up at `position`, rebalancing at most once.
pub(crate) async fn insert_entry_at(
    conn: &mut SqliteConnection,
    playlist_id: PlaylistId,
    position: usize,
    target: EntryTarget,
    ordering: SparseOrdering,
) -> Result<InsertOutcome> {
    let mut entries = load_entries(conn, playlist_id).await?;
    let position = position.min(entries.len());
    let mut rebalanced = false;

    let order = loop {
        let before = position
            .checked_sub(1)
            .and_then(|index| entries.get(index))
            .map(|entry| entry.entry_order);
        let after = entries.get(position).map(|entry| entry.entry_order);

        match ordering.key_between(before, after) {
            Some(order) => break order,
            None if !rebalanced => {
                entries = rebalance_entries(conn, playlist_id, ordering).await?;
                rebalanced = true;
            }
            None => {
                return Err(LibraryError::invalid_input(
                    "entry_order",
                    format!("no free key at position {} after rebalance", position),
                ))
            }
        }
    };

    let entry_id = insert_entry(conn, playlist_id, order, target).await?;
    Ok(InsertOutcome {
        entry_id,
        order,
        rebalanced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repositories::test_support::{insert_playlist, insert_requested};
    use bridge_traits::SystemClock;

    async fn setup() -> (SqlitePool, SqliteEntryOrdering, PlaylistId) {
        let pool = create_test_pool().await.unwrap();
        let playlist_id = insert_playlist(&pool, "Ordering").await;
        let store = SqliteEntryOrdering::new(pool.clone(), Arc::new(SystemClock), 100);
        (pool, store, playlist_id)
    }

    fn orders(entries: &[PlaylistEntry]) -> Vec<i64> {
        entries.iter().map(|entry| entry.entry_order).collect()
    }

    #[test]
    fn test_key_arithmetic() {
        let ordering = SparseOrdering::new(100);

        assert_eq!(ordering.append_key(None), 100);
        assert_eq!(ordering.append_key(Some(300)), 400);
        assert_eq!(ordering.key_between(Some(100), Some(200)), Some(150));
        assert_eq!(ordering.key_between(Some(100), Some(101)), None);
        assert_eq!(ordering.key_between(Some(100), Some(102)), Some(101));
        assert_eq!(ordering.key_between(None, Some(100)), Some(0));
        assert_eq!(ordering.key_between(None, Some(-50)), Some(-150));
        assert_eq!(ordering.rebalanced_key(0), 0);
        assert_eq!(ordering.rebalanced_key(2), 200);
    }

    #[tokio::test]
    async fn test_append_starts_at_step() {
        let (pool, store, playlist_id) = setup().await;
        let a = insert_requested(&pool, "A").await;
        let b = insert_requested(&pool, "B").await;

        let first = store.append(playlist_id, EntryTarget::RequestedTrack(a)).await.unwrap();
        let second = store.append(playlist_id, EntryTarget::RequestedTrack(b)).await.unwrap();

        assert_eq!(first.order, 100);
        assert_eq!(second.order, 200);
    }

    #[tokio::test]
    async fn test_insert_between_uses_midpoint() {
        let (pool, store, playlist_id) = setup().await;
        for title in ["A", "B"] {
            let id = insert_requested(&pool, title).await;
            store.append(playlist_id, EntryTarget::RequestedTrack(id)).await.unwrap();
        }

        let c = insert_requested(&pool, "C").await;
        let outcome = store
            .insert_at(playlist_id, 1, EntryTarget::RequestedTrack(c))
            .await
            .unwrap();

        assert_eq!(outcome.order, 150);
        assert!(!outcome.rebalanced);
        assert_eq!(orders(&store.entries(playlist_id).await.unwrap()), vec![100, 150, 200]);
    }

    #[tokio::test]
    async fn test_exhausted_gap_rebalances_exactly_once() {
        let (pool, store, playlist_id) = setup().await;
        for title in ["A", "B"] {
            let id = insert_requested(&pool, title).await;
            store.append(playlist_id, EntryTarget::RequestedTrack(id)).await.unwrap();
        }

        // 150, 125, 112, 106, 103, 101 fit between 100 and the previous insert.
        let mut rebalances = 0;
        for i in 0..7 {
            let id = insert_requested(&pool, &format!("filler {}", i)).await;
            let outcome = store
                .insert_at(playlist_id, 1, EntryTarget::RequestedTrack(id))
                .await
                .unwrap();
            if outcome.rebalanced {
                rebalances += 1;
                assert_eq!(i, 6);
                assert_eq!(outcome.order, 50);
            }
        }

        assert_eq!(rebalances, 1);
        let keys = orders(&store.entries(playlist_id).await.unwrap());
        assert_eq!(keys.len(), 9);
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_insert_before_head() {
        let (pool, store, playlist_id) = setup().await;
        let a = insert_requested(&pool, "A").await;
        store.append(playlist_id, EntryTarget::RequestedTrack(a)).await.unwrap();

        let b = insert_requested(&pool, "B").await;
        let outcome = store
            .insert_at(playlist_id, 0, EntryTarget::RequestedTrack(b))
            .await
            .unwrap();

        assert_eq!(outcome.order, 0);
        let entries = store.entries(playlist_id).await.unwrap();
        assert_eq!(entries[0].requested_track_id, Some(b));
    }

    #[tokio::test]
    async fn test_rebalance_renumbers_from_zero() {
        let (pool, store, playlist_id) = setup().await;
        for title in ["A", "B", "C"] {
            let id = insert_requested(&pool, title).await;
            store.append(playlist_id, EntryTarget::RequestedTrack(id)).await.unwrap();
        }

        assert_eq!(store.rebalance(playlist_id).await.unwrap(), 3);
        assert_eq!(orders(&store.entries(playlist_id).await.unwrap()), vec![0, 100, 200]);
    }

    #[tokio::test]
    async fn test_reorder_moves_block_preserving_relative_order() {
        let (pool, store, playlist_id) = setup().await;
        let mut ids = Vec::new();
        for title in ["A", "B", "C", "D", "E"] {
            let id = insert_requested(&pool, title).await;
            store.append(playlist_id, EntryTarget::RequestedTrack(id)).await.unwrap();
            ids.push(id);
        }

        // Move B and D to the front.
        let entries = store.reorder(playlist_id, &[3, 1], 0).await.unwrap();
        let order: Vec<_> = entries.iter().map(|e| e.requested_track_id.unwrap()).collect();

        assert_eq!(order, vec![ids[1], ids[3], ids[0], ids[2], ids[4]]);
        assert!(orders(&entries).windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_reorder_rejects_out_of_range_index() {
        let (pool, store, playlist_id) = setup().await;
        let a = insert_requested(&pool, "A").await;
        store.append(playlist_id, EntryTarget::RequestedTrack(a)).await.unwrap();

        let result = store.reorder(playlist_id, &[4], 0).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
        assert_eq!(store.entries(playlist_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_playlist_is_not_found() {
        let (pool, store, _) = setup().await;
        let a = insert_requested(&pool, "A").await;

        let result = store.append(PlaylistId(999), EntryTarget::RequestedTrack(a)).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let (pool, store, playlist_id) = setup().await;
        let a = insert_requested(&pool, "A").await;
        let outcome = store.append(playlist_id, EntryTarget::RequestedTrack(a)).await.unwrap();

        assert!(store.remove(playlist_id, outcome.entry_id).await.unwrap());
        assert!(!store.remove(playlist_id, outcome.entry_id).await.unwrap());
        assert!(store.entries(playlist_id).await.unwrap().is_empty());
    }
}
