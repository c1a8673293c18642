//! Spotify Web API response types

use serde::{Deserialize, Serialize};

/// Offset-paged list
#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// URL of the next page; `None` on the last one
    #[serde(default)]
    pub next: Option<String>,

    #[serde(default)]
    pub total: Option<usize>,
}

/// Simplified playlist object
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistTrackEntry {
    /// `null` for tracks removed from the catalog
    #[serde(default)]
    pub track: Option<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub uri: String,
    pub name: String,

    #[serde(default)]
    pub artists: Vec<NamedObject>,

    #[serde(default)]
    pub album: Option<NamedObject>,

    /// Local files cannot be added through the API
    #[serde(default)]
    pub is_local: bool,
}

impl SpotifyTrack {
    /// Primary artist name.
    pub fn artist(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedObject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Paging<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentUser {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct NewPlaylist<'a> {
    pub name: &'a str,
    pub public: bool,
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UriList<'a> {
    pub uris: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct TrackRemoval<'a> {
    pub tracks: Vec<UriRef<'a>>,
}

#[derive(Debug, Serialize)]
pub struct UriRef<'a> {
    pub uri: &'a str,
}
