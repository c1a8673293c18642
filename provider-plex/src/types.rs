//! Plex API response types
//!
//! Data structures for deserializing Plex Media Server JSON responses
//! (requested with `Accept: application/json`).

use serde::Deserialize;

/// Envelope around every Plex response
#[derive(Debug, Deserialize)]
pub struct MediaResponse<T> {
    #[serde(rename = "MediaContainer")]
    pub media_container: MediaContainer<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContainer<T> {
    /// Number of items in this page
    #[serde(default)]
    pub size: usize,

    /// Total items across pages, when the endpoint pages
    #[serde(default)]
    pub total_size: Option<usize>,

    /// Present on `/identity`
    #[serde(default)]
    pub machine_identifier: Option<String>,

    #[serde(rename = "Metadata", default = "Vec::new")]
    pub metadata: Vec<T>,
}

/// Playlist resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexPlaylist {
    pub rating_key: String,

    pub title: String,

    /// "audio", "video" or "photo"
    #[serde(default)]
    pub playlist_type: Option<String>,

    #[serde(default)]
    pub smart: bool,

    /// Unix seconds
    #[serde(default)]
    pub updated_at: Option<i64>,

    #[serde(default)]
    pub leaf_count: Option<u64>,
}

/// Track metadata, as listed in a playlist or returned by search
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexTrack {
    pub rating_key: String,

    pub title: String,

    /// "track" for audio tracks
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Album artist
    #[serde(default)]
    pub grandparent_title: Option<String>,

    /// Track artist when it differs from the album artist
    #[serde(default)]
    pub original_title: Option<String>,

    /// Album title
    #[serde(default)]
    pub parent_title: Option<String>,

    /// Position handle inside a playlist, needed for removals
    #[serde(rename = "playlistItemID", default)]
    pub playlist_item_id: Option<i64>,
}

impl PlexTrack {
    pub fn artist(&self) -> &str {
        self.original_title
            .as_deref()
            .or(self.grandparent_title.as_deref())
            .unwrap_or_default()
    }

    pub fn is_track(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "track")
    }
}
