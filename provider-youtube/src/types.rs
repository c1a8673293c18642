//! YouTube Data API v3 resource types

use serde::{Deserialize, Serialize};

/// Token-paged list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubePlaylist {
    pub id: String,
    pub snippet: PlaylistSnippet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSnippet {
    pub title: String,
}

/// Entry of a playlist. `id` is the handle used for deletion.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItemResource {
    pub id: String,
    pub snippet: PlaylistItemSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub title: String,

    /// Absent for deleted and private videos
    #[serde(default)]
    pub video_owner_channel_title: Option<String>,

    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: ResourceId,
    pub snippet: SearchSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnippet {
    pub title: String,

    #[serde(default)]
    pub channel_title: String,
}

#[derive(Debug, Deserialize)]
pub struct Channel {
    pub id: String,
}

/// Error envelope: `{"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}}`
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorReason {
    #[serde(default)]
    pub reason: String,
}

impl ErrorResponse {
    pub fn has_reason(&self, reason: &str) -> bool {
        self.error.errors.iter().any(|e| e.reason == reason)
    }
}

#[derive(Debug, Serialize)]
pub struct NewPlaylist<'a> {
    pub snippet: NewPlaylistSnippet<'a>,
    pub status: PlaylistStatus<'a>,
}

#[derive(Debug, Serialize)]
pub struct NewPlaylistSnippet<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistStatus<'a> {
    pub privacy_status: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewPlaylistItem<'a> {
    pub snippet: NewPlaylistItemSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlaylistItemSnippet<'a> {
    pub playlist_id: &'a str,
    pub resource_id: ResourceId,
}
