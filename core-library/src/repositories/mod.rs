//! # Repositories
//!
//! Data access for the local library.
//!
//! ## Available Repositories
//!
//! - `LocalPlaylistStore` - the local playlist as the sync engine reads and
//!   mutates it
//! - `EntryOrdering` - entry listing, positional insert and reorder over
//!   sparse order keys
//! - `MusicFileRepository` - library tracks and albums
//!
//! Multi-statement operations run in one transaction. The connection-level
//! helpers shared between repositories take `&mut SqliteConnection` so they
//! compose inside a caller's transaction.

pub mod music_file;
pub mod ordering;
pub mod playlist;

pub use music_file::{MusicFileRepository, SqliteMusicFileRepository};
pub use ordering::{EntryOrdering, InsertOutcome, SparseOrdering, SqliteEntryOrdering};
pub use playlist::{LocalPlaylistStore, SqlitePlaylistStore};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{PlaylistId, RequestedTrackId};
    use sqlx::SqlitePool;

    pub async fn insert_playlist(pool: &SqlitePool, name: &str) -> PlaylistId {
        let result = sqlx::query("INSERT INTO playlists (name, created_at, updated_at) VALUES (?, 0, 0)")
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        PlaylistId(result.last_insert_rowid())
    }

    pub async fn insert_requested(pool: &SqlitePool, title: &str) -> RequestedTrackId {
        let result = sqlx::query("INSERT INTO requested_tracks (artist, title) VALUES ('Test', ?)")
            .bind(title)
            .execute(pool)
            .await
            .unwrap();
        RequestedTrackId(result.last_insert_rowid())
    }
}
