//! YouTube Data API connector

use async_trait::async_trait;
use bridge_traits::{Clock, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_auth::{OAuthTokenSource, ServiceKind, TokenSource};
use core_library::PlaylistItem;
use core_runtime::config::OAuthClientCredentials;
use core_sync::{
    pick_candidate, with_timeout, AdapterFactory, AdapterResult, BatchOutcome, PlaylistSnapshot,
    RemotePlaylistAdapter, Resolution, SyncTarget,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, YouTubeError};
use crate::types::{
    Channel, ErrorResponse, ListResponse, NewPlaylist, NewPlaylistItem, NewPlaylistItemSnippet,
    NewPlaylistSnippet, PlaylistItemResource, PlaylistStatus, ResourceId, SearchResult,
    YouTubePlaylist,
};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Maximum `maxResults` for list endpoints
const PAGE_SIZE: &str = "50";

const SEARCH_LIMIT: &str = "5";

const VIDEO_KIND: &str = "youtube#video";

const TOPIC_SUFFIX: &str = " - Topic";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for one video search during a write
const ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Watch URL for a video ID.
pub fn video_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL, video_id)
}

/// Extract the video ID from a watch, short or embed URL.
///
/// ```
/// use provider_youtube::video_id_from_url;
///
/// assert_eq!(video_id_from_url("https://www.youtube.com/watch?v=abc123&t=4").as_deref(), Some("abc123"));
/// assert_eq!(video_id_from_url("https://youtu.be/abc123").as_deref(), Some("abc123"));
/// assert_eq!(video_id_from_url("https://example.com/"), None);
/// ```
pub fn video_id_from_url(url: &str) -> Option<String> {
    let raw = if let Some((_, query)) = url.split_once('?').filter(|_| url.contains("/watch")) {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))?
    } else if let Some((_, rest)) = url
        .split_once("youtu.be/")
        .or_else(|| url.split_once("/embed/"))
    {
        rest.split(['?', '&', '/']).next()?
    } else {
        return None;
    };

    let id = urlencoding::decode(raw).ok()?.into_owned();
    (!id.is_empty()).then_some(id)
}

/// Artist and title of a video.
///
/// "Artist - Title" video names are split on the first separator; anything
/// else takes the artist from the channel, minus a " - Topic" suffix.
fn split_video_title(title: &str, channel: &str) -> (String, String) {
    match title.split_once(" - ") {
        Some((artist, song)) if !artist.trim().is_empty() && !song.trim().is_empty() => {
            (artist.trim().to_string(), song.trim().to_string())
        }
        _ => (
            channel.trim_end_matches(TOPIC_SUFFIX).trim().to_string(),
            title.trim().to_string(),
        ),
    }
}

fn video_item(video_id: &str, title: &str, channel: &str) -> PlaylistItem {
    let (artist, song) = split_video_title(title, channel);
    PlaylistItem::new(artist, song).with_youtube_url(video_url(video_id))
}

/// YouTube Data API v3 connector
pub struct YouTubeConnector {
    http_client: Arc<dyn HttpClient>,
    token: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    bound_playlist: Option<String>,
    read_policy: RetryPolicy,
    item_timeout: Duration,
}

impl YouTubeConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            token,
            clock,
            bound_playlist: None,
            read_policy: RetryPolicy::with_retries(2),
            item_timeout: ITEM_TIMEOUT,
        }
    }

    pub fn with_bound_playlist(mut self, playlist_id: Option<String>) -> Self {
        self.bound_playlist = playlist_id;
        self
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    fn encode<T: Serialize>(body: &T) -> Result<Value> {
        serde_json::to_value(body)
            .map_err(|e| YouTubeError::ParseError(format!("Failed to encode request: {}", e)))
    }

    fn classify_failure(response: &HttpResponse) -> YouTubeError {
        let parsed = serde_json::from_slice::<ErrorResponse>(&response.body).ok();

        if response.status == 403 {
            if let Some(error) = &parsed {
                if error.has_reason("quotaExceeded") || error.has_reason("dailyLimitExceeded") {
                    return YouTubeError::QuotaExceeded;
                }
            }
        }

        YouTubeError::ApiError {
            status_code: response.status,
            message: parsed
                .map(|error| error.error.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string()),
        }
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let token = self.token.access_token().await?;
        let mut request = HttpRequest::new(method, format!("{}{}", API_BASE, path))
            .bearer_token(token)
            .timeout(REQUEST_TIMEOUT)
            .query(params)?;
        if let Some(body) = body {
            request = request.json(body)?;
        }

        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.status == 401 {
            self.token.invalidate().await;
            return Err(YouTubeError::AuthenticationFailed(
                "access token expired or revoked".to_string(),
            ));
        }

        Err(Self::classify_failure(&response))
    }

    #[instrument(skip_all, fields(method = ?method, path = %path))]
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
        policy: &RetryPolicy,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            match self.send_once(method, path, params, body).await {
                Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "YouTube request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .send(HttpMethod::Get, path, params, None, &self.read_policy)
            .await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| YouTubeError::ParseError(format!("Failed to parse response: {}", e)))
    }

    async fn write(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.send(method, path, params, body, &RetryPolicy::no_retry())
            .await
    }

    /// Every page of a token-paged list endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = params.to_vec();
            query.push(("maxResults", PAGE_SIZE.to_string()));
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: ListResponse<T> = self.read(path, &query).await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(items),
            }
        }
    }

    async fn find_playlist(&self, name: &str) -> Result<Option<YouTubePlaylist>> {
        let playlists: Vec<YouTubePlaylist> = match &self.bound_playlist {
            Some(playlist_id) => {
                let page: ListResponse<YouTubePlaylist> = self
                    .read(
                        "/playlists",
                        &[("part", "snippet".to_string()), ("id", playlist_id.clone())],
                    )
                    .await?;
                return Ok(page.items.into_iter().next());
            }
            None => {
                self.list_all(
                    "/playlists",
                    &[("part", "snippet".to_string()), ("mine", "true".to_string())],
                )
                .await?
            }
        };

        Ok(playlists
            .into_iter()
            .find(|playlist| playlist.snippet.title == name))
    }

    async fn require_playlist(&self, name: &str) -> Result<YouTubePlaylist> {
        self.find_playlist(name)
            .await?
            .ok_or_else(|| YouTubeError::PlaylistNotFound(name.to_string()))
    }

    /// Playable entries of a playlist with their items; deleted and private
    /// videos are left out.
    async fn list_entries(&self, playlist_id: &str) -> Result<Vec<(PlaylistItemResource, PlaylistItem)>> {
        let resources: Vec<PlaylistItemResource> = self
            .list_all(
                "/playlistItems",
                &[
                    ("part", "snippet".to_string()),
                    ("playlistId", playlist_id.to_string()),
                ],
            )
            .await?;

        let entries: Vec<_> = resources
            .into_iter()
            .filter_map(|resource| {
                let snippet = &resource.snippet;
                let channel = snippet.video_owner_channel_title.as_deref()?;
                let video_id = snippet.resource_id.video_id.as_deref()?;
                let item = video_item(video_id, &snippet.title, channel);
                Some((resource, item))
            })
            .collect();

        debug!(playlist_id, entries = entries.len(), "Listed playlist items");
        Ok(entries)
    }

    async fn search(&self, item: &PlaylistItem) -> Result<Option<PlaylistItem>> {
        let response: ListResponse<SearchResult> = self
            .read(
                "/search",
                &[
                    ("part", "snippet".to_string()),
                    ("type", "video".to_string()),
                    ("q", format!("{} {}", item.artist, item.title)),
                    ("maxResults", SEARCH_LIMIT.to_string()),
                ],
            )
            .await?;

        let candidates = response
            .items
            .iter()
            .filter_map(|result| {
                let video_id = result.id.video_id.as_deref()?;
                Some(video_item(video_id, &result.snippet.title, &result.snippet.channel_title))
            })
            .collect();

        Ok(pick_candidate(item, candidates))
    }

    /// Video IDs for `items`, searching for those without a usable URL.
    async fn resolve(&self, items: &[PlaylistItem]) -> Resolution<String> {
        let mut resolution = Resolution::default();

        for item in items {
            if let Some(video_id) = item.youtube_url.as_deref().and_then(video_id_from_url) {
                resolution.known(item, video_id);
                continue;
            }

            let found = with_timeout(self.item_timeout, self.fetch_media_item(item)).await;
            resolution.record(item, found, |video| {
                video.youtube_url.as_deref().and_then(video_id_from_url)
            });
        }

        resolution
    }

    async fn insert_videos(&self, playlist_id: &str, video_ids: &[String]) -> Result<()> {
        for video_id in video_ids {
            let body = Self::encode(&NewPlaylistItem {
                snippet: NewPlaylistItemSnippet {
                    playlist_id,
                    resource_id: ResourceId {
                        kind: VIDEO_KIND.to_string(),
                        video_id: Some(video_id.clone()),
                    },
                },
            })?;
            self.write(
                HttpMethod::Post,
                "/playlistItems",
                &[("part", "snippet".to_string())],
                Some(&body),
            )
            .await?;
        }
        Ok(())
    }

    async fn delete_entry(&self, entry_id: &str) -> Result<()> {
        self.write(HttpMethod::Delete, "/playlistItems", &[("id", entry_id.to_string())], None)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, playlist_id: &str) -> Result<usize> {
        let resources: Vec<PlaylistItemResource> = self
            .list_all(
                "/playlistItems",
                &[("part", "id".to_string()), ("playlistId", playlist_id.to_string())],
            )
            .await?;

        for resource in &resources {
            self.delete_entry(&resource.id).await?;
        }
        Ok(resources.len())
    }

    async fn create_remote(&self, name: &str, snapshot: &PlaylistSnapshot) -> Result<BatchOutcome> {
        let resolution = self.resolve(snapshot.items()).await;
        let video_ids = resolution.keys();

        let playlist_id = match &self.bound_playlist {
            Some(playlist_id) => {
                let cleared = self.delete_all(playlist_id).await?;
                debug!(playlist_id = %playlist_id, cleared, "Emptied bound YouTube playlist");
                playlist_id.clone()
            }
            None => {
                let body = Self::encode(&NewPlaylist {
                    snippet: NewPlaylistSnippet { title: name },
                    status: PlaylistStatus {
                        privacy_status: "private",
                    },
                })?;
                let response = self
                    .write(
                        HttpMethod::Post,
                        "/playlists",
                        &[("part", "snippet,status".to_string())],
                        Some(&body),
                    )
                    .await?;
                let created: YouTubePlaylist = serde_json::from_slice(&response.body).map_err(|e| {
                    YouTubeError::ParseError(format!("Failed to parse created playlist: {}", e))
                })?;
                created.id
            }
        };

        self.insert_videos(&playlist_id, &video_ids).await?;

        info!(playlist_id = %playlist_id, videos = video_ids.len(), "Seeded YouTube playlist");
        Ok(resolution.into_outcome())
    }

    async fn add_to_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let resolution = self.resolve(items).await;

        self.insert_videos(&playlist.id, &resolution.keys()).await?;
        Ok(resolution.into_outcome())
    }

    async fn remove_from_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let entries = self.list_entries(&playlist.id).await?;
        let mut removed: HashSet<&str> = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for item in items {
            let identity = item.identity_key();
            let wanted_video = item.youtube_url.as_deref().and_then(video_id_from_url);

            let entry = entries
                .iter()
                .filter(|(resource, _)| !removed.contains(resource.id.as_str()))
                .find(|(resource, listed)| {
                    wanted_video.is_some()
                        && resource.snippet.resource_id.video_id == wanted_video
                        || listed.identity_key() == identity
                });

            let Some((resource, _)) = entry else {
                warn!(track = %item, "Video not in YouTube playlist, skipping removal");
                outcome.skipped.push(item.clone());
                continue;
            };

            self.delete_entry(&resource.id).await?;
            removed.insert(resource.id.as_str());
            outcome.applied.push(item.clone());
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RemotePlaylistAdapter for YouTubeConnector {
    fn service(&self) -> ServiceKind {
        ServiceKind::YouTube
    }

    #[instrument(skip(self))]
    async fn is_authenticated(&self) -> bool {
        let result: Result<ListResponse<Channel>> = self
            .read(
                "/channels",
                &[("part", "id".to_string()), ("mine", "true".to_string())],
            )
            .await;

        match result {
            Ok(channels) if !channels.items.is_empty() => true,
            Ok(_) => {
                warn!("YouTube account has no channel");
                false
            }
            Err(e) => {
                warn!(error = %e, "YouTube authentication check failed");
                false
            }
        }
    }

    /// Snapshots are stamped with the time of the read.
    #[instrument(skip(self))]
    async fn get_playlist_snapshot(&self, name: &str) -> AdapterResult<Option<PlaylistSnapshot>> {
        let Some(playlist) = self.find_playlist(name).await? else {
            debug!("YouTube playlist does not exist");
            return Ok(None);
        };

        let entries = self.list_entries(&playlist.id).await?;
        let items = entries.into_iter().map(|(_, item)| item);
        Ok(Some(PlaylistSnapshot::new(name, self.clock.now(), items)))
    }

    #[instrument(skip(self, snapshot), fields(items = snapshot.len()))]
    async fn create_playlist(
        &self,
        name: &str,
        snapshot: &PlaylistSnapshot,
    ) -> AdapterResult<BatchOutcome> {
        Ok(self.create_remote(name, snapshot).await?)
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    async fn add_items(&self, name: &str, items: &[PlaylistItem]) -> AdapterResult<BatchOutcome> {
        Ok(self.add_to_remote(name, items).await?)
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    async fn remove_items(
        &self,
        name: &str,
        items: &[PlaylistItem],
    ) -> AdapterResult<BatchOutcome> {
        Ok(self.remove_from_remote(name, items).await?)
    }

    async fn fetch_media_item(&self, item: &PlaylistItem) -> AdapterResult<Option<PlaylistItem>> {
        Ok(self.search(item).await?)
    }

    #[instrument(skip(self))]
    async fn clear_playlist(&self, name: &str) -> AdapterResult<()> {
        let playlist = self.require_playlist(name).await?;
        let cleared = self.delete_all(&playlist.id).await?;
        info!(playlist_id = %playlist.id, cleared, "Cleared YouTube playlist");
        Ok(())
    }
}

/// Builds [`YouTubeConnector`]s sharing one OAuth token source.
pub struct YouTubeAdapterFactory {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    token: Arc<dyn TokenSource>,
    read_retries: u32,
    item_timeout: Duration,
}

impl YouTubeAdapterFactory {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        credentials: &OAuthClientCredentials,
        read_retries: u32,
    ) -> Self {
        let token = OAuthTokenSource::youtube(credentials, http_client.clone(), clock.clone())
            .with_retry_policy(RetryPolicy::with_retries(read_retries));

        Self {
            http_client,
            clock,
            token: Arc::new(token),
            read_retries,
            item_timeout: ITEM_TIMEOUT,
        }
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }
}

impl AdapterFactory for YouTubeAdapterFactory {
    fn service(&self) -> ServiceKind {
        ServiceKind::YouTube
    }

    fn build(&self, target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>> {
        let connector =
            YouTubeConnector::new(self.http_client.clone(), self.token.clone(), self.clock.clone())
                .with_bound_playlist(target.config.remote_playlist_id.clone())
                .with_read_policy(RetryPolicy::with_retries(self.read_retries))
                .with_item_timeout(self.item_timeout);

        Ok(Arc::new(connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use core_auth::StaticToken;
    use core_sync::AdapterError;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn respond(status: u16, body: &str) -> bridge_traits::error::Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    const PLAYLISTS: &str = r#"{
        "items": [ { "id": "PLroad", "snippet": { "title": "Road Trip" } } ]
    }"#;

    const ENTRIES_PAGE_1: &str = r#"{
        "nextPageToken": "page2",
        "items": [
            { "id": "e1", "snippet": { "title": "Queen - Innuendo (Official Video)",
              "videoOwnerChannelTitle": "Queen Official",
              "resourceId": { "kind": "youtube#video", "videoId": "vid1" } } },
            { "id": "e2", "snippet": { "title": "Private video",
              "resourceId": { "kind": "youtube#video", "videoId": "vid2" } } }
        ]
    }"#;

    const ENTRIES_PAGE_2: &str = r#"{
        "items": [
            { "id": "e3", "snippet": { "title": "Hey Jude",
              "videoOwnerChannelTitle": "The Beatles - Topic",
              "resourceId": { "kind": "youtube#video", "videoId": "vid3" } } }
        ]
    }"#;

    fn connector(http: MockHttpClient) -> YouTubeConnector {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
        YouTubeConnector::new(
            Arc::new(http),
            Arc::new(StaticToken::new(ServiceKind::YouTube, "yt-token")),
            clock,
        )
        .with_read_policy(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_retries(2)
        })
    }

    fn entries(req: &HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
        if req.url.contains("pageToken=page2") {
            respond(200, ENTRIES_PAGE_2)
        } else {
            respond(200, ENTRIES_PAGE_1)
        }
    }

    #[test]
    fn test_split_video_title() {
        assert_eq!(
            split_video_title("Queen - Innuendo", "Queen Official"),
            ("Queen".to_string(), "Innuendo".to_string())
        );
        assert_eq!(
            split_video_title("Hey Jude", "The Beatles - Topic"),
            ("The Beatles".to_string(), "Hey Jude".to_string())
        );
    }

    #[tokio::test]
    async fn test_snapshot_follows_pages_and_skips_private_videos() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(|req| {
            if req.url.contains("/playlistItems") {
                assert!(req.url.contains("playlistId=PLroad"));
                entries(&req)
            } else {
                assert!(req.url.contains("mine=true"));
                respond(200, PLAYLISTS)
            }
        });

        let snapshot = connector(mock_http)
            .get_playlist_snapshot("Road Trip")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.items()[0].artist, "Queen");
        assert_eq!(
            snapshot.items()[0].youtube_url.as_deref(),
            Some("https://www.youtube.com/watch?v=vid1")
        );
        assert_eq!(snapshot.items()[1].identity_key(), "beatles - hey jude");
    }

    #[tokio::test]
    async fn test_add_items_inserts_one_video_per_request() {
        let inserted = Arc::new(Mutex::new(Vec::new()));
        let log = inserted.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.method == HttpMethod::Post {
                let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                log.lock()
                    .unwrap()
                    .push(body["snippet"]["resourceId"]["videoId"].as_str().unwrap().to_string());
                respond(200, r#"{ "id": "new" }"#)
            } else if req.url.contains("/search") {
                respond(
                    200,
                    r#"{ "items": [
                        { "id": { "kind": "youtube#video", "videoId": "found1" },
                          "snippet": { "title": "Prince - Purple Rain", "channelTitle": "Prince" } }
                    ] }"#,
                )
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![
            PlaylistItem::new("Queen", "Innuendo").with_youtube_url("https://youtu.be/vid1"),
            PlaylistItem::new("Prince", "Purple Rain"),
        ];
        let outcome = connector(mock_http).add_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(
            outcome.applied[1].youtube_url.as_deref(),
            Some("https://www.youtube.com/watch?v=found1")
        );
        assert_eq!(*inserted.lock().unwrap(), vec!["vid1", "found1"]);
    }

    #[tokio::test]
    async fn test_quota_error_on_search_fails_only_that_track() {
        let inserted = Arc::new(Mutex::new(Vec::new()));
        let log = inserted.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.method == HttpMethod::Post {
                let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                log.lock()
                    .unwrap()
                    .push(body["snippet"]["resourceId"]["videoId"].as_str().unwrap().to_string());
                respond(200, r#"{ "id": "new" }"#)
            } else if req.url.contains("/search") {
                respond(
                    403,
                    r#"{ "error": { "code": 403, "message": "quota", "errors": [{ "reason": "quotaExceeded" }] } }"#,
                )
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![
            PlaylistItem::new("Prince", "Purple Rain"),
            PlaylistItem::new("Queen", "Innuendo").with_youtube_url("https://youtu.be/vid1"),
        ];
        let outcome = connector(mock_http).add_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].item.title, "Purple Rain");
        assert!(matches!(outcome.failed[0].error, AdapterError::Api { status: 403, .. }));
        assert_eq!(*inserted.lock().unwrap(), vec!["vid1"]);
    }

    #[tokio::test]
    async fn test_remove_items_deletes_entries() {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let log = deleted.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.method == HttpMethod::Delete {
                log.lock().unwrap().push(req.url.clone());
                respond(204, "")
            } else if req.url.contains("/playlistItems") {
                entries(&req)
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![
            PlaylistItem::new("Beatles", "Hey Jude"),
            PlaylistItem::new("Nobody", "Nothing"),
        ];
        let outcome = connector(mock_http).remove_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            *deleted.lock().unwrap(),
            vec!["https://www.googleapis.com/youtube/v3/playlistItems?id=e3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            respond(
                403,
                r#"{ "error": { "code": 403, "message": "quota", "errors": [{ "reason": "quotaExceeded" }] } }"#,
            )
        });

        let result = connector(mock_http).get_playlist_snapshot("Road Trip").await;
        assert!(matches!(result, Err(AdapterError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_bound_playlist_that_vanished_reads_as_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("id=PLgone"));
            respond(200, r#"{ "items": [] }"#)
        });

        let snapshot = connector(mock_http)
            .with_bound_playlist(Some("PLgone".to_string()))
            .get_playlist_snapshot("Road Trip")
            .await
            .unwrap();
        assert!(snapshot.is_none());
    }
}
