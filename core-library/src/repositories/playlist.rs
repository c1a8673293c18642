//! Local playlist store used by the sync engine

use async_trait::async_trait;
use bridge_traits::Clock;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{LibraryError, Result};
use crate::matching::{best_match, REMOVAL_MATCH_THRESHOLD};
use crate::models::{
    millis_to_datetime, EntryId, EntryTarget, LocalPlaylist, MusicFile, Playlist, PlaylistEntry,
    PlaylistId, PlaylistItem, RequestedTrack, RequestedTrackId,
};
use crate::repositories::music_file::{
    album_tracks, music_file_by_id, music_file_by_identity_keys, music_files_by_normalized_title,
};
use crate::repositories::ordering::{append_entry, load_entries, touch_playlist, SparseOrdering};

/// The local playlist as the sync engine sees it.
#[async_trait]
pub trait LocalPlaylistStore: Send + Sync {
    /// Load a playlist with albums and nested playlists flattened into
    /// tracks, in entry order.
    ///
    /// # Returns
    /// - `Ok(Some(playlist))` if found
    /// - `Ok(None)` if not found
    async fn get_by_id(&self, id: PlaylistId) -> Result<Option<LocalPlaylist>>;

    /// Append the library track matching `item`.
    ///
    /// Identity keys are tried first. Otherwise library tracks with the
    /// same title are ranked by match score; with `normalize` the titles are
    /// compared in normalized form, without it case-insensitively.
    ///
    /// # Returns
    /// The new entry, or `None` when the library has no such track.
    async fn add_music_file(
        &self,
        playlist_id: PlaylistId,
        item: &PlaylistItem,
        normalize: bool,
    ) -> Result<Option<EntryId>>;

    /// Append a placeholder for a track the library does not own, keeping
    /// every identifier `item` carries.
    async fn add_requested_track(&self, playlist_id: PlaylistId, item: &PlaylistItem)
        -> Result<EntryId>;

    /// Remove the direct entry that is the same track as `item`.
    ///
    /// Resolved by identity key, else by best match score. A best score below
    /// [`REMOVAL_MATCH_THRESHOLD`] leaves the playlist untouched.
    ///
    /// # Returns
    /// `true` if an entry was removed.
    async fn remove_music_file(&self, playlist_id: PlaylistId, item: &PlaylistItem) -> Result<bool>;
}

/// SQLite implementation of [`LocalPlaylistStore`]
pub struct SqlitePlaylistStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    ordering: SparseOrdering,
}

impl SqlitePlaylistStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, order_step: i64) -> Self {
        Self {
            pool,
            clock,
            ordering: SparseOrdering::new(order_step),
        }
    }

    /// Create an empty playlist.
    pub async fn create(&self, name: &str) -> Result<Playlist> {
        Playlist::validate_name(name).map_err(|e| LibraryError::invalid_input("Playlist", e))?;

        let now = self.clock.unix_timestamp_millis();
        let result = query("INSERT INTO playlists (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Playlist {
            id: PlaylistId(result.last_insert_rowid()),
            name: name.to_string(),
            updated_at: now,
            created_at: now,
        })
    }

    pub async fn find_playlist(&self, id: PlaylistId) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>(
            "SELECT id, name, updated_at, created_at FROM playlists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    /// Append an entry of any kind, such as an album or a nested playlist.
    pub async fn append_entry(&self, playlist_id: PlaylistId, target: EntryTarget) -> Result<EntryId> {
        if let EntryTarget::NestedPlaylist(nested) = target {
            if nested == playlist_id {
                return Err(LibraryError::invalid_input(
                    "nested_playlist_id",
                    "a playlist cannot contain itself",
                ));
            }
        }

        let mut tx = self.pool.begin().await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        let (entry_id, _) = append_entry(&mut tx, playlist_id, target, self.ordering).await?;
        tx.commit().await?;

        Ok(entry_id)
    }
}

#[async_trait]
impl LocalPlaylistStore for SqlitePlaylistStore {
    #[instrument(skip(self), fields(playlist_id = %id))]
    async fn get_by_id(&self, id: PlaylistId) -> Result<Option<LocalPlaylist>> {
        let Some(playlist) = self.find_playlist(id).await? else {
            return Ok(None);
        };

        let mut conn = self.pool.acquire().await?;
        let items = flatten_playlist(&mut conn, id).await?;

        Ok(Some(LocalPlaylist {
            id,
            name: playlist.name,
            updated_at: millis_to_datetime(playlist.updated_at),
            items,
        }))
    }

    #[instrument(skip(self, item), fields(playlist_id = %playlist_id, track = %item))]
    async fn add_music_file(
        &self,
        playlist_id: PlaylistId,
        item: &PlaylistItem,
        normalize: bool,
    ) -> Result<Option<EntryId>> {
        let mut tx = self.pool.begin().await?;

        let file = match music_file_by_identity_keys(&mut tx, item).await? {
            Some(file) => Some(file),
            None => {
                let candidates = if normalize {
                    music_files_by_normalized_title(&mut tx, &item.title).await?
                } else {
                    music_files_by_title(&mut tx, &item.title).await?
                };
                best_match(item, &candidates).map(|(file, _)| file.clone())
            }
        };

        let Some(file) = file else {
            debug!("No library track matches");
            return Ok(None);
        };

        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        let (entry_id, _) =
            append_entry(&mut tx, playlist_id, EntryTarget::MusicFile(file.id), self.ordering)
                .await?;
        tx.commit().await?;

        debug!(music_file_id = %file.id, "Linked library track");
        Ok(Some(entry_id))
    }

    #[instrument(skip(self, item), fields(playlist_id = %playlist_id, track = %item))]
    async fn add_requested_track(
        &self,
        playlist_id: PlaylistId,
        item: &PlaylistItem,
    ) -> Result<EntryId> {
        let mut tx = self.pool.begin().await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;

        let result = query(
            r#"
            INSERT INTO requested_tracks (
                artist, title, album, spotify_uri, youtube_url, plex_rating_key
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.artist)
        .bind(&item.title)
        .bind(&item.album)
        .bind(&item.spotify_uri)
        .bind(&item.youtube_url)
        .bind(&item.plex_rating_key)
        .execute(&mut *tx)
        .await?;

        let requested_id = RequestedTrackId(result.last_insert_rowid());
        let (entry_id, _) = append_entry(
            &mut tx,
            playlist_id,
            EntryTarget::RequestedTrack(requested_id),
            self.ordering,
        )
        .await?;
        tx.commit().await?;

        Ok(entry_id)
    }

    #[instrument(skip(self, item), fields(playlist_id = %playlist_id, track = %item))]
    async fn remove_music_file(&self, playlist_id: PlaylistId, item: &PlaylistItem) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let mut entry_ids = Vec::new();
        let mut candidates = Vec::new();
        for entry in load_entries(&mut tx, playlist_id).await? {
            if let Some(resolved) = direct_entry_item(&mut tx, &entry).await? {
                entry_ids.push(entry.id);
                candidates.push(resolved);
            }
        }

        let matched = match candidates.iter().position(|candidate| candidate.shares_identity_key(item)) {
            Some(index) => Some(index),
            None => match best_match(item, &candidates) {
                Some((best, score)) if score >= REMOVAL_MATCH_THRESHOLD => candidates
                    .iter()
                    .position(|candidate| std::ptr::eq(candidate, best)),
                Some((best, score)) => {
                    warn!(score, closest = %best, "Best local match below removal threshold");
                    None
                }
                None => None,
            },
        };

        let entry_id = matched.map(|index| entry_ids[index]);
        let Some(entry_id) = entry_id else {
            return Ok(false);
        };

        query("DELETE FROM playlist_entries WHERE id = ?")
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        touch_playlist(&mut tx, playlist_id, self.clock.unix_timestamp_millis()).await?;
        tx.commit().await?;

        debug!(entry_id = %entry_id, "Removed playlist entry");
        Ok(true)
    }
}

// =============================================================================
// Flattening
// =============================================================================

async fn music_files_by_title(conn: &mut SqliteConnection, title: &str) -> Result<Vec<MusicFile>> {
    let files = query_as::<_, MusicFile>(
        r#"
        SELECT id, artist, title, album, local_path, spotify_uri, youtube_url, plex_rating_key,
               normalized_artist, normalized_title, album_id, album_position
        FROM music_files
        WHERE LOWER(TRIM(title)) = LOWER(TRIM(?))
        ORDER BY id
        "#,
    )
    .bind(title)
    .fetch_all(&mut *conn)
    .await?;

    Ok(files)
}

async fn requested_track_by_id(
    conn: &mut SqliteConnection,
    id: RequestedTrackId,
) -> Result<Option<RequestedTrack>> {
    let track = query_as::<_, RequestedTrack>(
        r#"
        SELECT id, artist, title, album, spotify_uri, youtube_url, plex_rating_key
        FROM requested_tracks
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(track)
}

/// Item of a music file or requested track entry. Albums and nested
/// playlists are not direct entries.
async fn direct_entry_item(
    conn: &mut SqliteConnection,
    entry: &PlaylistEntry,
) -> Result<Option<PlaylistItem>> {
    match entry.target() {
        Some(EntryTarget::MusicFile(id)) => {
            Ok(music_file_by_id(conn, id).await?.map(|file| file.to_item()))
        }
        Some(EntryTarget::RequestedTrack(id)) => {
            Ok(requested_track_by_id(conn, id).await?.map(|track| track.to_item()))
        }
        _ => Ok(None),
    }
}

/// Expand a playlist's entries into tracks, depth first.
///
/// A nested playlist that is already being expanded further up is skipped,
/// so a cycle contributes its tracks once.
async fn flatten_playlist(
    conn: &mut SqliteConnection,
    root: PlaylistId,
) -> Result<Vec<PlaylistItem>> {
    let mut items = Vec::new();
    let mut path = vec![root];
    let mut stack = vec![load_entries(conn, root).await?.into_iter()];

    while let Some(frame) = stack.last_mut() {
        let Some(entry) = frame.next() else {
            stack.pop();
            path.pop();
            continue;
        };

        match entry.target() {
            Some(EntryTarget::Album(album_id)) => {
                items.extend(album_tracks(conn, album_id).await?.iter().map(MusicFile::to_item));
            }
            Some(EntryTarget::NestedPlaylist(nested)) => {
                if path.contains(&nested) {
                    warn!(playlist_id = %root, nested_playlist_id = %nested, "Skipping nested playlist cycle");
                    continue;
                }
                let entries = load_entries(conn, nested).await?;
                path.push(nested);
                stack.push(entries.into_iter());
            }
            Some(_) => {
                if let Some(item) = direct_entry_item(conn, &entry).await? {
                    items.push(item);
                }
            }
            None => {
                warn!(entry_id = %entry.id, "Skipping playlist entry without a reference");
            }
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::NewMusicFile;
    use crate::repositories::music_file::{MusicFileRepository, SqliteMusicFileRepository};
    use bridge_traits::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        store: SqlitePlaylistStore,
        library: SqliteMusicFileRepository,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        Fixture {
            store: SqlitePlaylistStore::new(pool.clone(), Arc::new(SystemClock), 100),
            library: SqliteMusicFileRepository::new(pool),
        }
    }

    async fn own(fixture: &Fixture, item: PlaylistItem) -> MusicFile {
        fixture.library.insert(&NewMusicFile::new(item)).await.unwrap()
    }

    fn titles(playlist: &LocalPlaylist) -> Vec<&str> {
        playlist.items.iter().map(|item| item.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_by_id_missing_playlist() {
        let fixture = setup().await;
        assert!(fixture.store.get_by_id(PlaylistId(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_music_file_links_normalized_title_match() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Mix").await.unwrap();
        let file = own(&fixture, PlaylistItem::new("The Beatles", "Hey Jude")).await;

        let remote = PlaylistItem::new("Beatles", "Hey Jude (2009 Remaster)")
            .with_spotify_uri("spotify:track:hj");
        let entry = fixture
            .store
            .add_music_file(playlist.id, &remote, true)
            .await
            .unwrap();
        assert!(entry.is_some());

        let loaded = fixture.store.get_by_id(playlist.id).await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].music_file_id, Some(file.id));
    }

    #[tokio::test]
    async fn test_add_music_file_without_normalize_needs_same_title() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Mix").await.unwrap();
        own(&fixture, PlaylistItem::new("The Beatles", "Hey Jude")).await;

        let remote = PlaylistItem::new("Beatles", "Hey Jude (2009 Remaster)");
        let entry = fixture
            .store
            .add_music_file(playlist.id, &remote, false)
            .await
            .unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_add_requested_track_keeps_identifiers() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Wishlist").await.unwrap();

        let remote = PlaylistItem::new("Unknown", "Rare B-Side")
            .with_youtube_url("https://music.youtube.com/watch?v=abc")
            .with_plex_rating_key("991");
        fixture.store.add_requested_track(playlist.id, &remote).await.unwrap();

        let loaded = fixture.store.get_by_id(playlist.id).await.unwrap().unwrap();
        assert_eq!(loaded.items[0].youtube_url.as_deref(), Some("https://music.youtube.com/watch?v=abc"));
        assert_eq!(loaded.items[0].plex_rating_key.as_deref(), Some("991"));
        assert!(loaded.items[0].music_file_id.is_none());
    }

    #[tokio::test]
    async fn test_remove_by_identity_key_then_by_score() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Mix").await.unwrap();
        own(&fixture, PlaylistItem::new("Queen", "Bohemian Rhapsody").with_local_path("/m/bo.flac")).await;
        own(&fixture, PlaylistItem::new("Abba", "Waterloo")).await;
        for title in ["Bohemian Rhapsody", "Waterloo"] {
            fixture
                .store
                .add_music_file(playlist.id, &PlaylistItem::new("", title), true)
                .await
                .unwrap()
                .unwrap();
        }

        let by_key = PlaylistItem::new("Other", "Other").with_local_path("/m/bo.flac");
        assert!(fixture.store.remove_music_file(playlist.id, &by_key).await.unwrap());

        let by_score = PlaylistItem::new("ABBA", "Waterloo (Remastered)");
        assert!(fixture.store.remove_music_file(playlist.id, &by_score).await.unwrap());

        let loaded = fixture.store.get_by_id(playlist.id).await.unwrap().unwrap();
        assert!(loaded.items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_below_threshold_leaves_playlist() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Mix").await.unwrap();
        fixture
            .store
            .add_requested_track(playlist.id, &PlaylistItem::new("Queen", "Innuendo"))
            .await
            .unwrap();

        let unrelated = PlaylistItem::new("Abba", "Waterloo");
        assert!(!fixture.store.remove_music_file(playlist.id, &unrelated).await.unwrap());
        assert_eq!(fixture.store.get_by_id(playlist.id).await.unwrap().unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_expands_albums_and_nested_playlists() {
        let fixture = setup().await;
        let album = fixture.library.insert_album("Animals", "Pink Floyd").await.unwrap();
        for (position, title) in [(1, "Pigs on the Wing 1"), (2, "Dogs")] {
            fixture
                .library
                .insert(&NewMusicFile::new(PlaylistItem::new("Pink Floyd", title)).on_album(album.id, position))
                .await
                .unwrap();
        }

        let outer = fixture.store.create("Outer").await.unwrap();
        let inner = fixture.store.create("Inner").await.unwrap();
        fixture
            .store
            .add_requested_track(inner.id, &PlaylistItem::new("Inner", "Inner Track"))
            .await
            .unwrap();
        // Inner refers back to outer; the cycle is cut.
        fixture.store.append_entry(inner.id, EntryTarget::NestedPlaylist(outer.id)).await.unwrap();

        fixture.store.append_entry(outer.id, EntryTarget::Album(album.id)).await.unwrap();
        fixture.store.append_entry(outer.id, EntryTarget::NestedPlaylist(inner.id)).await.unwrap();
        fixture
            .store
            .add_requested_track(outer.id, &PlaylistItem::new("Outer", "Last"))
            .await
            .unwrap();

        let loaded = fixture.store.get_by_id(outer.id).await.unwrap().unwrap();
        assert_eq!(titles(&loaded), vec!["Pigs on the Wing 1", "Dogs", "Inner Track", "Last"]);
    }

    #[tokio::test]
    async fn test_append_entry_rejects_self_nesting() {
        let fixture = setup().await;
        let playlist = fixture.store.create("Self").await.unwrap();

        let result = fixture
            .store
            .append_entry(playlist.id, EntryTarget::NestedPlaylist(playlist.id))
            .await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_mutations_bump_updated_at() {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let store = SqlitePlaylistStore::new(pool, clock.clone(), 100);
        let playlist = store.create("Clocked").await.unwrap();
        let before = store.get_by_id(playlist.id).await.unwrap().unwrap().updated_at;

        clock.advance_millis(5_000);
        store
            .add_requested_track(playlist.id, &PlaylistItem::new("A", "B"))
            .await
            .unwrap();

        let after = store.get_by_id(playlist.id).await.unwrap().unwrap().updated_at;
        assert_eq!((after - before).num_milliseconds(), 5_000);
    }
}
