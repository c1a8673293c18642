//! Plex Media Server connector
//!
//! Implements `RemotePlaylistAdapter` over the Plex HTTP API.

use async_trait::async_trait;
use bridge_traits::{Clock, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use chrono::{DateTime, Utc};
use core_auth::{ServiceKind, StaticToken, TokenSource};
use core_library::PlaylistItem;
use core_runtime::config::PlexCredentials;
use core_sync::{
    pick_candidate, with_timeout, AdapterFactory, AdapterResult, BatchOutcome, PlaylistSnapshot,
    RemotePlaylistAdapter, Resolution, SyncTarget,
};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlexError, Result};
use crate::types::{MediaResponse, PlexPlaylist, PlexTrack};

/// Rating keys per playlist write
const WRITE_BATCH_SIZE: usize = 100;

/// Items per page when listing a playlist
const PAGE_SIZE: usize = 100;

/// Plex metadata type for tracks
const TRACK_TYPE: &str = "10";

const SEARCH_LIMIT: &str = "10";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for one track lookup
const ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Plex Media Server connector
///
/// One instance serves one sync target. If the target names a playlist
/// rating key, that playlist is used regardless of its title.
///
/// # Example
///
/// ```ignore
/// use provider_plex::PlexConnector;
///
/// let connector = PlexConnector::new(http_client, token, clock, "http://127.0.0.1:32400");
/// let snapshot = connector.get_playlist_snapshot("Road Trip").await?;
/// ```
pub struct PlexConnector {
    http_client: Arc<dyn HttpClient>,
    token: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    base_url: String,
    bound_playlist: Option<String>,
    read_policy: RetryPolicy,
    item_timeout: Duration,
    machine_identifier: OnceCell<String>,
}

impl PlexConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token,
            clock,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bound_playlist: None,
            read_policy: RetryPolicy::with_retries(2),
            item_timeout: ITEM_TIMEOUT,
            machine_identifier: OnceCell::new(),
        }
    }

    /// Use the playlist with this rating key instead of looking it up by title.
    pub fn with_bound_playlist(mut self, rating_key: Option<String>) -> Self {
        self.bound_playlist = rating_key;
        self
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Bound each track lookup of a write. A lookup over the bound fails that
    /// track only.
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    fn to_item(track: &PlexTrack) -> PlaylistItem {
        let mut item =
            PlaylistItem::new(track.artist(), &track.title).with_plex_rating_key(&track.rating_key);
        item.album = track.parent_title.clone();
        item
    }

    fn library_uri(machine: &str, keys: &[String]) -> String {
        format!(
            "server://{}/com.plexapp.plugins.library/library/metadata/{}",
            machine,
            keys.join(",")
        )
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<MediaResponse<T>> {
        serde_json::from_slice(&response.body)
            .map_err(|e| PlexError::ParseError(format!("Failed to parse response: {}", e)))
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<HttpResponse> {
        let token = self.token.access_token().await?;
        let request = HttpRequest::new(method, format!("{}{}", self.base_url, path))
            .header("X-Plex-Token", token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .query(params)?;

        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        if response.status == 401 {
            self.token.invalidate().await;
            return Err(PlexError::AuthenticationFailed("token rejected by server".to_string()));
        }

        Err(PlexError::ApiError {
            status_code: response.status,
            message: String::from_utf8_lossy(&response.body).to_string(),
        })
    }

    /// Execute a request, retrying transient failures per `policy`.
    #[instrument(skip_all, fields(method = ?method, path = %path))]
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
        policy: &RetryPolicy,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            match self.send_once(method, path, params).await {
                Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Plex request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<MediaResponse<T>> {
        let response = self.send(HttpMethod::Get, path, params, &self.read_policy).await?;
        Self::parse(&response)
    }

    async fn write(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<HttpResponse> {
        self.send(method, path, params, &RetryPolicy::no_retry()).await
    }

    async fn machine_identifier(&self) -> Result<&str> {
        let id = self
            .machine_identifier
            .get_or_try_init(|| async {
                let identity = self.read::<serde_json::Value>("/identity", &[]).await?;
                identity.media_container.machine_identifier.ok_or_else(|| {
                    PlexError::ParseError("identity response without machineIdentifier".to_string())
                })
            })
            .await?;
        Ok(id.as_str())
    }

    async fn find_playlist(&self, name: &str) -> Result<Option<PlexPlaylist>> {
        if let Some(rating_key) = &self.bound_playlist {
            return match self
                .read::<PlexPlaylist>(&format!("/playlists/{}", rating_key), &[])
                .await
            {
                Ok(response) => Ok(response.media_container.metadata.into_iter().next()),
                Err(PlexError::ApiError {
                    status_code: 404, ..
                }) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let response = self
            .read::<PlexPlaylist>("/playlists", &[("playlistType", "audio".to_string())])
            .await?;

        Ok(response
            .media_container
            .metadata
            .into_iter()
            .find(|playlist| !playlist.smart && playlist.title == name))
    }

    async fn require_playlist(&self, name: &str) -> Result<PlexPlaylist> {
        self.find_playlist(name)
            .await?
            .ok_or_else(|| PlexError::PlaylistNotFound(name.to_string()))
    }

    async fn list_tracks(&self, rating_key: &str) -> Result<Vec<PlexTrack>> {
        let path = format!("/playlists/{}/items", rating_key);
        let mut tracks = Vec::new();

        loop {
            let page = self
                .read::<PlexTrack>(
                    &path,
                    &[
                        ("X-Plex-Container-Start", tracks.len().to_string()),
                        ("X-Plex-Container-Size", PAGE_SIZE.to_string()),
                    ],
                )
                .await?
                .media_container;

            let fetched = page.metadata.len();
            tracks.extend(page.metadata);

            let complete = page.total_size.map_or(false, |total| tracks.len() >= total);
            if fetched < PAGE_SIZE || complete {
                break;
            }
        }

        debug!(rating_key, tracks = tracks.len(), "Listed playlist items");
        Ok(tracks)
    }

    async fn search(&self, item: &PlaylistItem) -> Result<Option<PlaylistItem>> {
        let response = self
            .read::<PlexTrack>(
                "/search",
                &[
                    ("query", item.title.clone()),
                    ("type", TRACK_TYPE.to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await?;

        let candidates: Vec<PlaylistItem> = response
            .media_container
            .metadata
            .iter()
            .filter(|track| track.is_track())
            .map(Self::to_item)
            .collect();

        Ok(pick_candidate(item, candidates))
    }

    /// Rating keys for `items`, searching for those without one.
    async fn resolve(&self, items: &[PlaylistItem]) -> Resolution<String> {
        let mut resolution = Resolution::default();

        for item in items {
            if let Some(key) = &item.plex_rating_key {
                resolution.known(item, key.clone());
                continue;
            }

            let found = with_timeout(self.item_timeout, self.fetch_media_item(item)).await;
            resolution.record(item, found, |track| track.plex_rating_key.clone());
        }

        resolution
    }

    async fn append_keys(&self, rating_key: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let machine = self.machine_identifier().await?;
        let path = format!("/playlists/{}/items", rating_key);
        for chunk in keys.chunks(WRITE_BATCH_SIZE) {
            self.write(HttpMethod::Put, &path, &[("uri", Self::library_uri(machine, chunk))])
                .await?;
        }
        Ok(())
    }

    async fn create_remote(&self, name: &str, snapshot: &PlaylistSnapshot) -> Result<BatchOutcome> {
        let resolution = self.resolve(snapshot.items()).await;
        let keys = resolution.keys();

        if let Some(rating_key) = &self.bound_playlist {
            self.write(HttpMethod::Delete, &format!("/playlists/{}/items", rating_key), &[])
                .await?;
            self.append_keys(rating_key, &keys).await?;
            info!(rating_key = %rating_key, tracks = keys.len(), "Replaced bound Plex playlist");
            return Ok(resolution.into_outcome());
        }

        let (first, rest) = keys.split_at(keys.len().min(WRITE_BATCH_SIZE));
        let mut params = vec![
            ("type", "audio".to_string()),
            ("title", name.to_string()),
            ("smart", "0".to_string()),
        ];
        if !first.is_empty() {
            let machine = self.machine_identifier().await?;
            params.push(("uri", Self::library_uri(machine, first)));
        }

        let response = self.write(HttpMethod::Post, "/playlists", &params).await?;
        let created = Self::parse::<PlexPlaylist>(&response)?
            .media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| PlexError::ParseError("create returned no playlist".to_string()))?;

        self.append_keys(&created.rating_key, rest).await?;

        info!(rating_key = %created.rating_key, tracks = keys.len(), "Created Plex playlist");
        Ok(resolution.into_outcome())
    }

    async fn add_to_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let resolution = self.resolve(items).await;

        self.append_keys(&playlist.rating_key, &resolution.keys()).await?;
        Ok(resolution.into_outcome())
    }

    async fn remove_from_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let tracks = self.list_tracks(&playlist.rating_key).await?;
        let mut removed = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for item in items {
            let identity = item.identity_key();
            let position = tracks
                .iter()
                .filter(|track| {
                    track
                        .playlist_item_id
                        .map_or(false, |id| !removed.contains(&id))
                })
                .find(|track| {
                    item.plex_rating_key.as_deref() == Some(track.rating_key.as_str())
                        || Self::to_item(track).identity_key() == identity
                })
                .and_then(|track| track.playlist_item_id);

            let Some(position) = position else {
                warn!(track = %item, "Track not in Plex playlist, skipping removal");
                outcome.skipped.push(item.clone());
                continue;
            };

            self.write(
                HttpMethod::Delete,
                &format!("/playlists/{}/items/{}", playlist.rating_key, position),
                &[],
            )
            .await?;
            removed.insert(position);
            outcome.applied.push(item.clone());
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RemotePlaylistAdapter for PlexConnector {
    fn service(&self) -> ServiceKind {
        ServiceKind::Plex
    }

    #[instrument(skip(self))]
    async fn is_authenticated(&self) -> bool {
        match self.read::<serde_json::Value>("/library/sections", &[]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Plex authentication check failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_playlist_snapshot(&self, name: &str) -> AdapterResult<Option<PlaylistSnapshot>> {
        let Some(playlist) = self.find_playlist(name).await? else {
            debug!("Plex playlist does not exist");
            return Ok(None);
        };

        let tracks = self.list_tracks(&playlist.rating_key).await?;
        let last_updated = playlist
            .updated_at
            .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
            .unwrap_or_else(|| self.clock.now());

        let items = tracks.iter().filter(|track| track.is_track()).map(Self::to_item);
        Ok(Some(PlaylistSnapshot::new(name, last_updated, items)))
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
        self.write(
            HttpMethod::Delete,
            &format!("/playlists/{}/items", playlist.rating_key),
            &[],
        )
        .await?;
        Ok(())
    }
}

/// Builds [`PlexConnector`]s for Plex sync targets.
pub struct PlexAdapterFactory {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    credentials: PlexCredentials,
    read_retries: u32,
    item_timeout: Duration,
}

impl PlexAdapterFactory {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        credentials: PlexCredentials,
        read_retries: u32,
    ) -> Self {
        Self {
            http_client,
            clock,
            credentials,
            read_retries,
            item_timeout: ITEM_TIMEOUT,
        }
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }
}

impl AdapterFactory for PlexAdapterFactory {
    fn service(&self) -> ServiceKind {
        ServiceKind::Plex
    }

    fn build(&self, target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>> {
        let token = Arc::new(StaticToken::new(ServiceKind::Plex, self.credentials.token.clone()));
        let connector = PlexConnector::new(
            self.http_client.clone(),
            token,
            self.clock.clone(),
            self.credentials.base_url.clone(),
        )
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
    use chrono::TimeZone;
    use core_sync::AdapterError;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

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
        "MediaContainer": {
            "size": 2,
            "Metadata": [
                { "ratingKey": "3", "title": "Road Trip", "smart": true },
                { "ratingKey": "9", "title": "Road Trip", "smart": false, "updatedAt": 1700000000 }
            ]
        }
    }"#;

    const ITEMS: &str = r#"{
        "MediaContainer": {
            "size": 2,
            "totalSize": 2,
            "Metadata": [
                { "ratingKey": "101", "title": "Innuendo", "type": "track", "grandparentTitle": "Queen", "parentTitle": "Innuendo", "playlistItemID": 77 },
                { "ratingKey": "102", "title": "Hey Jude", "type": "track", "grandparentTitle": "The Beatles", "playlistItemID": 78 }
            ]
        }
    }"#;

    const IDENTITY: &str = r#"{ "MediaContainer": { "size": 0, "machineIdentifier": "srv1" } }"#;

    fn connector(http: MockHttpClient) -> PlexConnector {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        PlexConnector::new(
            Arc::new(http),
            Arc::new(StaticToken::new(ServiceKind::Plex, "plex-token")),
            clock,
            "http://plex.local:32400/",
        )
        .with_read_policy(RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_retries(2)
        })
    }

    #[tokio::test]
    async fn test_snapshot_reads_titled_audio_playlist() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            assert_eq!(req.headers.get("X-Plex-Token"), Some(&"plex-token".to_string()));
            if req.url.contains("/playlists/9/items") {
                assert!(req.url.contains("X-Plex-Container-Start=0"));
                respond(200, ITEMS)
            } else {
                assert_eq!(req.url, "http://plex.local:32400/playlists?playlistType=audio");
                respond(200, PLAYLISTS)
            }
        });

        let snapshot = connector(mock_http)
            .get_playlist_snapshot("Road Trip")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.last_updated().timestamp(), 1_700_000_000);
        assert_eq!(snapshot.items()[0].plex_rating_key.as_deref(), Some("101"));
        assert_eq!(snapshot.items()[0].album.as_deref(), Some("Innuendo"));
        assert_eq!(snapshot.items()[1].artist, "The Beatles");
    }

    #[tokio::test]
    async fn test_missing_playlist_reads_as_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| respond(200, PLAYLISTS));

        let snapshot = connector(mock_http).get_playlist_snapshot("Unknown").await.unwrap();
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn test_reads_retry_server_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                respond(503, "busy")
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let snapshot = connector(mock_http).get_playlist_snapshot("Unknown").await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_add_items_batches_rating_keys() {
        let puts = Arc::new(AtomicUsize::new(0));
        let counter = puts.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.url.contains("/identity") {
                respond(200, IDENTITY)
            } else if req.method == HttpMethod::Put {
                assert!(req.url.contains("/playlists/9/items?uri=server%3A%2F%2Fsrv1%2F"));
                counter.fetch_add(1, Ordering::SeqCst);
                respond(200, "{}")
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items: Vec<PlaylistItem> = (0..250)
            .map(|i| PlaylistItem::new("Artist", format!("Track {}", i)).with_plex_rating_key(i.to_string()))
            .collect();

        let outcome = connector(mock_http).add_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 250);
        assert!(outcome.skipped.is_empty());
        assert_eq!(puts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unresolvable_items_are_skipped() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(|req| {
            assert_ne!(req.method, HttpMethod::Put);
            if req.url.contains("/search") {
                assert!(req.url.contains("type=10"));
                respond(200, r#"{ "MediaContainer": { "size": 0 } }"#)
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let outcome = connector(mock_http)
            .add_items("Road Trip", &[PlaylistItem::new("Nobody", "Unreleased")])
            .await
            .unwrap();

        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_fails_only_its_track() {
        let put_urls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = put_urls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.url.contains("/search") && req.url.contains("Broken") {
                respond(500, "search backend down")
            } else if req.url.contains("/search") {
                respond(200, ITEMS)
            } else if req.url.contains("/identity") {
                respond(200, IDENTITY)
            } else if req.method == HttpMethod::Put {
                log.lock().unwrap().push(req.url.clone());
                respond(200, "{}")
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![
            PlaylistItem::new("Nobody", "Broken"),
            PlaylistItem::new("Queen", "Innuendo"),
        ];
        let outcome = connector(mock_http).add_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].plex_rating_key.as_deref(), Some("101"));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].item.title, "Broken");
        assert!(outcome.has_failures());
        let puts = put_urls.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].ends_with("metadata%2F101"));
    }

    /// Answers every request after `delay`.
    struct SlowServer {
        delay: Duration,
    }

    #[async_trait]
    impl HttpClient for SlowServer {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            if request.url.contains("/search") {
                tokio::time::sleep(self.delay).await;
                return respond(200, ITEMS);
            }
            respond(200, PLAYLISTS)
        }
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_per_track() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let connector = PlexConnector::new(
            Arc::new(SlowServer {
                delay: Duration::from_millis(200),
            }),
            Arc::new(StaticToken::new(ServiceKind::Plex, "plex-token")),
            clock,
            "http://plex.local:32400",
        )
        .with_item_timeout(Duration::from_millis(10));

        let items = vec![PlaylistItem::new("Queen", "Innuendo")];
        let outcome = connector.add_items("Road Trip", &items).await.unwrap();

        assert!(outcome.applied.is_empty());
        assert!(matches!(
            outcome.failed[0].error,
            AdapterError::Timeout { limit } if limit == Duration::from_millis(10)
        ));
    }

    #[tokio::test]
    async fn test_writes_are_not_retried() {
        let puts = Arc::new(AtomicUsize::new(0));
        let counter = puts.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.url.contains("/identity") {
                respond(200, IDENTITY)
            } else if req.method == HttpMethod::Put {
                counter.fetch_add(1, Ordering::SeqCst);
                respond(503, "busy")
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![PlaylistItem::new("Queen", "Innuendo").with_plex_rating_key("101")];
        let result = connector(mock_http).add_items("Road Trip", &items).await;

        assert!(matches!(result, Err(AdapterError::TransientNetwork(_))));
        assert_eq!(puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_items_deletes_by_playlist_item_id() {
        let deleted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = deleted.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.method == HttpMethod::Delete {
                log.lock().unwrap().push(req.url.clone());
                respond(200, "")
            } else if req.url.contains("/items") {
                respond(200, ITEMS)
            } else {
                respond(200, PLAYLISTS)
            }
        });

        let items = vec![
            PlaylistItem::new("Beatles", "Hey Jude (2009 Remaster)"),
            PlaylistItem::new("Queen", "Bohemian Rhapsody"),
        ];
        let outcome = connector(mock_http).remove_items("Road Trip", &items).await.unwrap();

        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(
            *deleted.lock().unwrap(),
            vec!["http://plex.local:32400/playlists/9/items/78".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_token_fails_authentication_check() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| respond(401, "Unauthorized"));

        assert!(!connector(mock_http).is_authenticated().await);
    }
}
