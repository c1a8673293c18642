//! Music file and album repository

use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

use crate::error::{LibraryError, Result};
use crate::matching::{normalize_artist, normalize_title};
use crate::models::{Album, AlbumId, MusicFile, MusicFileId, NewMusicFile, PlaylistItem};

const MUSIC_FILE_COLUMNS: &str = r#"
    id, artist, title, album, local_path, spotify_uri, youtube_url, plex_rating_key,
    normalized_artist, normalized_title, album_id, album_position
"#;

/// Library track access used by the playlist store and by seeding code.
#[async_trait]
pub trait MusicFileRepository: Send + Sync {
    /// Insert a music file, computing its normalized columns.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty title and a database error when
    /// the local path is already taken.
    async fn insert(&self, file: &NewMusicFile) -> Result<MusicFile>;

    async fn find_by_id(&self, id: MusicFileId) -> Result<Option<MusicFile>>;

    /// First music file sharing any populated identity key with `item`.
    async fn find_by_identity_keys(&self, item: &PlaylistItem) -> Result<Option<MusicFile>>;

    /// Music files whose normalized title equals `normalize_title(title)`.
    async fn find_by_normalized_title(&self, title: &str) -> Result<Vec<MusicFile>>;

    async fn insert_album(&self, title: &str, artist: &str) -> Result<Album>;

    /// Tracks of an album in album order.
    async fn album_tracks(&self, album_id: AlbumId) -> Result<Vec<MusicFile>>;
}

/// SQLite implementation of [`MusicFileRepository`]
pub struct SqliteMusicFileRepository {
    pool: SqlitePool,
}

impl SqliteMusicFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MusicFileRepository for SqliteMusicFileRepository {
    async fn insert(&self, file: &NewMusicFile) -> Result<MusicFile> {
        file.validate()
            .map_err(|e| LibraryError::invalid_input("MusicFile", e))?;

        let item = &file.item;
        let result = query(
            r#"
            INSERT INTO music_files (
                artist, title, album, local_path, spotify_uri, youtube_url, plex_rating_key,
                normalized_artist, normalized_title, album_id, album_position
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.artist)
        .bind(&item.title)
        .bind(&item.album)
        .bind(&item.local_path)
        .bind(&item.spotify_uri)
        .bind(&item.youtube_url)
        .bind(&item.plex_rating_key)
        .bind(normalize_artist(&item.artist))
        .bind(normalize_title(&item.title))
        .bind(file.album_id)
        .bind(file.album_position)
        .execute(&self.pool)
        .await?;

        let id = MusicFileId(result.last_insert_rowid());
        self.find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("MusicFile", id))
    }

    async fn find_by_id(&self, id: MusicFileId) -> Result<Option<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        music_file_by_id(&mut conn, id).await
    }

    async fn find_by_identity_keys(&self, item: &PlaylistItem) -> Result<Option<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        music_file_by_identity_keys(&mut conn, item).await
    }

    async fn find_by_normalized_title(&self, title: &str) -> Result<Vec<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        music_files_by_normalized_title(&mut conn, title).await
    }

    async fn insert_album(&self, title: &str, artist: &str) -> Result<Album> {
        if title.trim().is_empty() {
            return Err(LibraryError::invalid_input("Album", "Album title cannot be empty"));
        }

        let result = query("INSERT INTO albums (title, artist) VALUES (?, ?)")
            .bind(title)
            .bind(artist)
            .execute(&self.pool)
            .await?;

        Ok(Album {
            id: AlbumId(result.last_insert_rowid()),
            title: title.to_string(),
            artist: artist.to_string(),
        })
    }

    async fn album_tracks(&self, album_id: AlbumId) -> Result<Vec<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        album_tracks(&mut conn, album_id).await
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

pub(crate) async fn music_file_by_id(
    conn: &mut SqliteConnection,
    id: MusicFileId,
) -> Result<Option<MusicFile>> {
    let sql = format!("SELECT {} FROM music_files WHERE id = ?", MUSIC_FILE_COLUMNS);
    let file = query_as::<_, MusicFile>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(file)
}

pub(crate) async fn music_file_by_identity_keys(
    conn: &mut SqliteConnection,
    item: &PlaylistItem,
) -> Result<Option<MusicFile>> {
    let keys = [
        ("local_path", item.local_path.as_deref()),
        ("youtube_url", item.youtube_url.as_deref()),
        ("spotify_uri", item.spotify_uri.as_deref()),
        ("plex_rating_key", item.plex_rating_key.as_deref()),
    ];

    if let Some(id) = item.music_file_id {
        if let Some(file) = music_file_by_id(conn, id).await? {
            return Ok(Some(file));
        }
    }

    for (column, value) in keys {
        let Some(value) = value else { continue };
        let sql = format!(
            "SELECT {} FROM music_files WHERE {} = ? ORDER BY id LIMIT 1",
            MUSIC_FILE_COLUMNS, column
        );
        let file = query_as::<_, MusicFile>(&sql)
            .bind(value)
            .fetch_optional(&mut *conn)
            .await?;
        if file.is_some() {
            return Ok(file);
        }
    }

    Ok(None)
}

pub(crate) async fn music_files_by_normalized_title(
    conn: &mut SqliteConnection,
    title: &str,
) -> Result<Vec<MusicFile>> {
    let sql = format!(
        "SELECT {} FROM music_files WHERE normalized_title = ? ORDER BY id",
        MUSIC_FILE_COLUMNS
    );
    let files = query_as::<_, MusicFile>(&sql)
        .bind(normalize_title(title))
        .fetch_all(&mut *conn)
        .await?;

    Ok(files)
}

pub(crate) async fn album_tracks(
    conn: &mut SqliteConnection,
    album_id: AlbumId,
) -> Result<Vec<MusicFile>> {
    let sql = format!(
        "SELECT {} FROM music_files WHERE album_id = ? ORDER BY album_position, id",
        MUSIC_FILE_COLUMNS
    );
    let files = query_as::<_, MusicFile>(&sql)
        .bind(album_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup() -> SqliteMusicFileRepository {
        SqliteMusicFileRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_computes_normalized_columns() {
        let repo = setup().await;
        let file = repo
            .insert(&NewMusicFile::new(
                PlaylistItem::new("The Beatles", "Hey Jude (2009 Remaster)")
                    .with_local_path("/music/hey-jude.flac"),
            ))
            .await
            .unwrap();

        assert_eq!(file.normalized_artist, "beatles");
        assert_eq!(file.normalized_title, "hey jude");
        assert_eq!(file.to_item().music_file_id, Some(file.id));
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_title() {
        let repo = setup().await;
        let result = repo.insert(&NewMusicFile::new(PlaylistItem::new("A", "  "))).await;

        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_find_by_identity_keys() {
        let repo = setup().await;
        let inserted = repo
            .insert(&NewMusicFile::new(
                PlaylistItem::new("Queen", "Bohemian Rhapsody").with_spotify_uri("spotify:track:bo"),
            ))
            .await
            .unwrap();

        let query = PlaylistItem::new("Someone", "Else").with_spotify_uri("spotify:track:bo");
        let found = repo.find_by_identity_keys(&query).await.unwrap().unwrap();
        assert_eq!(found.id, inserted.id);

        let miss = PlaylistItem::new("Queen", "Bohemian Rhapsody");
        assert!(repo.find_by_identity_keys(&miss).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_normalized_title() {
        let repo = setup().await;
        for (artist, title) in [("Queen", "Heroes"), ("David Bowie", "Heroes (Single Version)"), ("Abba", "Waterloo")] {
            repo.insert(&NewMusicFile::new(PlaylistItem::new(artist, title))).await.unwrap();
        }

        let found = repo.find_by_normalized_title("Heroes - Mono").await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_album_tracks_in_album_order() {
        let repo = setup().await;
        let album = repo.insert_album("Abbey Road", "The Beatles").await.unwrap();

        for (position, title) in [(2, "Something"), (1, "Come Together")] {
            repo.insert(
                &NewMusicFile::new(PlaylistItem::new("The Beatles", title)).on_album(album.id, position),
            )
            .await
            .unwrap();
        }

        let titles: Vec<_> = repo
            .album_tracks(album.id)
            .await
            .unwrap()
            .into_iter()
            .map(|file| file.title)
            .collect();
        assert_eq!(titles, vec!["Come Together", "Something"]);
    }
}
