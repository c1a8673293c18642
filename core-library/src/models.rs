//! Domain models for the local playlist library
//!
//! This module contains the playlist item value type shared by every sync
//! component plus the rows the SQLite store maps to.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::matching::{normalize_artist, normalize_title, Matchable};

// =============================================================================
// ID Types
// =============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Unique identifier for a local playlist
    PlaylistId
);
row_id!(
    /// Unique identifier for a music file in the library
    MusicFileId
);
row_id!(
    /// Unique identifier for a requested (not yet owned) track
    RequestedTrackId
);
row_id!(
    /// Unique identifier for an album
    AlbumId
);
row_id!(
    /// Unique identifier for a playlist entry
    EntryId
);

/// Convert stored epoch milliseconds to a UTC timestamp.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// =============================================================================
// Playlist Item
// =============================================================================

/// One track as seen by the sync engine, local or remote.
///
/// Identity keys compare exactly. An item without any identity key is
/// identified by its normalized "artist - title" string, see
/// [`identity_key`](PlaylistItem::identity_key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plex_rating_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_file_id: Option<MusicFileId>,
}

impl PlaylistItem {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_spotify_uri(mut self, uri: impl Into<String>) -> Self {
        self.spotify_uri = Some(uri.into());
        self
    }

    pub fn with_youtube_url(mut self, url: impl Into<String>) -> Self {
        self.youtube_url = Some(url.into());
        self
    }

    pub fn with_plex_rating_key(mut self, key: impl Into<String>) -> Self {
        self.plex_rating_key = Some(key.into());
        self
    }

    /// Normalized "artist - title" string.
    ///
    /// ```
    /// use core_library::models::PlaylistItem;
    ///
    /// let item = PlaylistItem::new("The Beatles", "Hey Jude (2009 Remaster)");
    /// assert_eq!(item.identity_key(), "beatles - hey jude");
    /// ```
    pub fn identity_key(&self) -> String {
        format!(
            "{} - {}",
            normalize_artist(&self.artist),
            normalize_title(&self.title)
        )
    }

    /// Whether `other` shares any populated identity key with this item.
    pub fn shares_identity_key(&self, other: &PlaylistItem) -> bool {
        fn same(a: &Option<String>, b: &Option<String>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a == b)
        }

        same(&self.local_path, &other.local_path)
            || same(&self.youtube_url, &other.youtube_url)
            || same(&self.spotify_uri, &other.spotify_uri)
            || same(&self.plex_rating_key, &other.plex_rating_key)
    }

    /// Copy identity keys from `other` where this item has none.
    pub fn merge_identity_keys(&mut self, other: &PlaylistItem) {
        fn fill(slot: &mut Option<String>, value: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        fill(&mut self.local_path, &other.local_path);
        fill(&mut self.spotify_uri, &other.spotify_uri);
        fill(&mut self.youtube_url, &other.youtube_url);
        fill(&mut self.plex_rating_key, &other.plex_rating_key);
        if self.music_file_id.is_none() {
            self.music_file_id = other.music_file_id;
        }
        if self.album.is_none() {
            self.album.clone_from(&other.album);
        }
    }
}

impl fmt::Display for PlaylistItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

impl Matchable for PlaylistItem {
    fn match_artist(&self) -> &str {
        &self.artist
    }

    fn match_title(&self) -> &str {
        &self.title
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Music file owned by the library
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MusicFile {
    pub id: MusicFileId,
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub local_path: Option<String>,
    pub spotify_uri: Option<String>,
    pub youtube_url: Option<String>,
    pub plex_rating_key: Option<String>,
    pub normalized_artist: String,
    pub normalized_title: String,
    pub album_id: Option<AlbumId>,
    pub album_position: Option<i64>,
}

impl MusicFile {
    pub fn to_item(&self) -> PlaylistItem {
        PlaylistItem {
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
            local_path: self.local_path.clone(),
            spotify_uri: self.spotify_uri.clone(),
            youtube_url: self.youtube_url.clone(),
            plex_rating_key: self.plex_rating_key.clone(),
            music_file_id: Some(self.id),
        }
    }
}

impl Matchable for MusicFile {
    fn match_artist(&self) -> &str {
        &self.artist
    }

    fn match_title(&self) -> &str {
        &self.title
    }
}

/// Input for inserting a music file
#[derive(Debug, Clone, Default)]
pub struct NewMusicFile {
    pub item: PlaylistItem,
    pub album_id: Option<AlbumId>,
    pub album_position: Option<i64>,
}

impl NewMusicFile {
    pub fn new(item: PlaylistItem) -> Self {
        Self {
            item,
            album_id: None,
            album_position: None,
        }
    }

    pub fn on_album(mut self, album_id: AlbumId, position: i64) -> Self {
        self.album_id = Some(album_id);
        self.album_position = Some(position);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.item.title.trim().is_empty() {
            return Err("Music file title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Placeholder for a track the playlist wants but the library does not own.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RequestedTrack {
    pub id: RequestedTrackId,
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub spotify_uri: Option<String>,
    pub youtube_url: Option<String>,
    pub plex_rating_key: Option<String>,
}

impl RequestedTrack {
    pub fn to_item(&self) -> PlaylistItem {
        PlaylistItem {
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
            local_path: None,
            spotify_uri: self.spotify_uri.clone(),
            youtube_url: self.youtube_url.clone(),
            plex_rating_key: self.plex_rating_key.clone(),
            music_file_id: None,
        }
    }
}

/// Album grouping of music files
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub artist: String,
}

/// Local playlist row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    /// Epoch milliseconds of the last content change
    pub updated_at: i64,
    pub created_at: i64,
}

impl Playlist {
    pub fn validate_name(name: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }
        if name.len() > 255 {
            return Err("Playlist name cannot exceed 255 characters".to_string());
        }
        Ok(())
    }
}

/// What a playlist entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    MusicFile,
    RequestedTrack,
    Album,
    NestedPlaylist,
}

/// Entry of a local playlist.
///
/// Exactly one of the reference columns is set, matching `kind`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PlaylistEntry {
    pub id: EntryId,
    pub playlist_id: PlaylistId,
    /// Sparse order key, strictly increasing in list order
    pub entry_order: i64,
    pub kind: EntryKind,
    pub music_file_id: Option<MusicFileId>,
    pub requested_track_id: Option<RequestedTrackId>,
    pub album_id: Option<AlbumId>,
    pub nested_playlist_id: Option<PlaylistId>,
}

impl PlaylistEntry {
    /// The entry's payload, detached from its position.
    pub fn target(&self) -> Option<EntryTarget> {
        match self.kind {
            EntryKind::MusicFile => self.music_file_id.map(EntryTarget::MusicFile),
            EntryKind::RequestedTrack => self.requested_track_id.map(EntryTarget::RequestedTrack),
            EntryKind::Album => self.album_id.map(EntryTarget::Album),
            EntryKind::NestedPlaylist => self.nested_playlist_id.map(EntryTarget::NestedPlaylist),
        }
    }
}

/// Payload of a playlist entry, used when inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTarget {
    MusicFile(MusicFileId),
    RequestedTrack(RequestedTrackId),
    Album(AlbumId),
    NestedPlaylist(PlaylistId),
}

impl EntryTarget {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryTarget::MusicFile(_) => EntryKind::MusicFile,
            EntryTarget::RequestedTrack(_) => EntryKind::RequestedTrack,
            EntryTarget::Album(_) => EntryKind::Album,
            EntryTarget::NestedPlaylist(_) => EntryKind::NestedPlaylist,
        }
    }
}

/// A local playlist flattened into the items a sync round compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlaylist {
    pub id: PlaylistId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<PlaylistItem>,
}
