//! Spotify Web API connector
//!
//! Implements `RemotePlaylistAdapter` over `api.spotify.com/v1`.

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
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{
    CurrentUser, NewPlaylist, Paging, PlaylistTrackEntry, SearchResponse, SpotifyPlaylist,
    SpotifyTrack, TrackRemoval, UriList, UriRef,
};

const API_BASE: &str = "https://api.spotify.com/v1";

/// URIs per add, replace or remove call
const WRITE_BATCH_SIZE: usize = 100;

const TRACK_PAGE_SIZE: usize = 100;

/// Maximum page size of `/me/playlists`
const PLAYLIST_PAGE_SIZE: usize = 50;

const SEARCH_LIMIT: &str = "5";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for one track search during a write
const ITEM_TIMEOUT: Duration = Duration::from_secs(30);

const PLAYLIST_DESCRIPTION: &str = "Mirrored from the local library";

/// Spotify Web API connector
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
///
/// let connector = SpotifyConnector::new(http_client, token_source, clock);
/// let snapshot = connector.get_playlist_snapshot("Road Trip").await?;
/// ```
pub struct SpotifyConnector {
    http_client: Arc<dyn HttpClient>,
    token: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    bound_playlist: Option<String>,
    read_policy: RetryPolicy,
    item_timeout: Duration,
}

impl SpotifyConnector {
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

    /// Use the playlist with this ID instead of looking it up by name.
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

    fn to_item(track: &SpotifyTrack) -> PlaylistItem {
        let mut item = PlaylistItem::new(track.artist(), &track.name).with_spotify_uri(&track.uri);
        item.album = track.album.as_ref().map(|album| album.name.clone());
        item
    }

    fn encode<T: Serialize>(body: &T) -> Result<Value> {
        serde_json::to_value(body)
            .map_err(|e| SpotifyError::ParseError(format!("Failed to encode request: {}", e)))
    }

    fn retry_after(response: &HttpResponse) -> Option<u64> {
        response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
            .and_then(|(_, value)| value.trim().parse().ok())
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

        match response.status {
            401 => {
                self.token.invalidate().await;
                Err(SpotifyError::AuthenticationFailed(
                    "access token expired or revoked".to_string(),
                ))
            }
            429 => Err(SpotifyError::RateLimited {
                retry_after_secs: Self::retry_after(&response),
            }),
            status_code => Err(SpotifyError::ApiError {
                status_code,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }),
        }
    }

    /// Execute a request, retrying transient failures per `policy`.
    ///
    /// A `Retry-After` hint stretches the backoff up to the policy's
    /// maximum delay.
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
                    let mut delay = policy.delay_for(attempt);
                    if let SpotifyError::RateLimited {
                        retry_after_secs: Some(seconds),
                    } = &e
                    {
                        delay = delay.max(Duration::from_secs(*seconds).min(policy.max_delay));
                    }
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Spotify request failed, retrying"
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
            .map_err(|e| SpotifyError::ParseError(format!("Failed to parse response: {}", e)))
    }

    async fn write(&self, method: HttpMethod, path: &str, body: &Value) -> Result<HttpResponse> {
        self.send(method, path, &[], Some(body), &RetryPolicy::no_retry())
            .await
    }

    async fn find_playlist(&self, name: &str) -> Result<Option<SpotifyPlaylist>> {
        if let Some(playlist_id) = &self.bound_playlist {
            let path = format!("/playlists/{}", playlist_id);
            return match self
                .read::<SpotifyPlaylist>(&path, &[("fields", "id,name,snapshot_id".to_string())])
                .await
            {
                Ok(playlist) => Ok(Some(playlist)),
                Err(SpotifyError::ApiError {
                    status_code: 404, ..
                }) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let mut offset = 0;
        loop {
            let page: Paging<SpotifyPlaylist> = self
                .read(
                    "/me/playlists",
                    &[
                        ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            offset += page.items.len();
            if let Some(found) = page.items.into_iter().find(|playlist| playlist.name == name) {
                return Ok(Some(found));
            }
            if page.next.is_none() {
                return Ok(None);
            }
        }
    }

    async fn require_playlist(&self, name: &str) -> Result<SpotifyPlaylist> {
        self.find_playlist(name)
            .await?
            .ok_or_else(|| SpotifyError::PlaylistNotFound(name.to_string()))
    }

    async fn list_tracks(&self, playlist_id: &str) -> Result<Vec<SpotifyTrack>> {
        let path = format!("/playlists/{}/tracks", playlist_id);
        let mut offset = 0;
        let mut tracks = Vec::new();

        loop {
            let page: Paging<PlaylistTrackEntry> = self
                .read(
                    &path,
                    &[
                        ("limit", TRACK_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            offset += page.items.len();
            tracks.extend(page.items.into_iter().filter_map(|entry| entry.track));

            if page.next.is_none() {
                break;
            }
        }

        debug!(playlist_id, tracks = tracks.len(), "Listed playlist tracks");
        Ok(tracks)
    }

    fn search_query(item: &PlaylistItem) -> String {
        let mut query = format!("track:{} artist:{}", item.title, item.artist);
        if let Some(album) = &item.album {
            query.push_str(&format!(" album:{}", album));
        }
        query
    }

    async fn search(&self, item: &PlaylistItem) -> Result<Option<PlaylistItem>> {
        let response: SearchResponse = self
            .read(
                "/search",
                &[
                    ("q", Self::search_query(item)),
                    ("type", "track".to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await?;

        let candidates = response.tracks.items.iter().map(Self::to_item).collect();
        Ok(pick_candidate(item, candidates))
    }

    /// Spotify URIs for `items`, searching for those without one.
    async fn resolve(&self, items: &[PlaylistItem]) -> Resolution<String> {
        let mut resolution = Resolution::default();

        for item in items {
            if let Some(uri) = &item.spotify_uri {
                resolution.known(item, uri.clone());
                continue;
            }

            let found = with_timeout(self.item_timeout, self.fetch_media_item(item)).await;
            resolution.record(item, found, |track| track.spotify_uri.clone());
        }

        resolution
    }

    async fn append_uris(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let path = format!("/playlists/{}/tracks", playlist_id);
        for chunk in uris.chunks(WRITE_BATCH_SIZE) {
            let body = Self::encode(&UriList { uris: chunk })?;
            self.write(HttpMethod::Post, &path, &body).await?;
        }
        Ok(())
    }

    /// Replace the playlist's contents with `uris`.
    async fn replace_uris(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let (first, rest) = uris.split_at(uris.len().min(WRITE_BATCH_SIZE));
        let body = Self::encode(&UriList { uris: first })?;
        self.write(HttpMethod::Put, &format!("/playlists/{}/tracks", playlist_id), &body)
            .await?;
        self.append_uris(playlist_id, rest).await
    }

    async fn create_remote(&self, name: &str, snapshot: &PlaylistSnapshot) -> Result<BatchOutcome> {
        let resolution = self.resolve(snapshot.items()).await;
        let uris = resolution.keys();

        if let Some(playlist_id) = &self.bound_playlist {
            self.replace_uris(playlist_id, &uris).await?;
            info!(playlist_id = %playlist_id, tracks = uris.len(), "Replaced bound Spotify playlist");
            return Ok(resolution.into_outcome());
        }

        let user: CurrentUser = self.read("/me", &[]).await?;
        let body = Self::encode(&NewPlaylist {
            name,
            public: false,
            description: PLAYLIST_DESCRIPTION,
        })?;
        let response = self
            .write(HttpMethod::Post, &format!("/users/{}/playlists", user.id), &body)
            .await?;
        let created: SpotifyPlaylist = serde_json::from_slice(&response.body)
            .map_err(|e| SpotifyError::ParseError(format!("Failed to parse created playlist: {}", e)))?;

        self.append_uris(&created.id, &uris).await?;

        info!(playlist_id = %created.id, tracks = uris.len(), "Created Spotify playlist");
        Ok(resolution.into_outcome())
    }

    async fn add_to_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let resolution = self.resolve(items).await;

        self.append_uris(&playlist.id, &resolution.keys()).await?;
        Ok(resolution.into_outcome())
    }

    /// Removal by URI drops every occurrence of that track.
    async fn remove_from_remote(&self, name: &str, items: &[PlaylistItem]) -> Result<BatchOutcome> {
        let playlist = self.require_playlist(name).await?;
        let tracks = self.list_tracks(&playlist.id).await?;
        let mut outcome = BatchOutcome::default();
        let mut uris: Vec<String> = Vec::new();

        for item in items {
            let identity = item.identity_key();
            let found = tracks.iter().find(|track| {
                item.spotify_uri.as_deref() == Some(track.uri.as_str())
                    || Self::to_item(track).identity_key() == identity
            });

            match found {
                Some(track) => {
                    if !uris.contains(&track.uri) {
                        uris.push(track.uri.clone());
                    }
                    outcome.applied.push(item.clone());
                }
                None => {
                    warn!(track = %item, "Track not in Spotify playlist, skipping removal");
                    outcome.skipped.push(item.clone());
                }
            }
        }

        let path = format!("/playlists/{}/tracks", playlist.id);
        for chunk in uris.chunks(WRITE_BATCH_SIZE) {
            let body = Self::encode(&TrackRemoval {
                tracks: chunk.iter().map(|uri| UriRef { uri }).collect(),
            })?;
            self.write(HttpMethod::Delete, &path, &body).await?;
        }

        Ok(outcome)
    }
}

#[async_trait]
impl RemotePlaylistAdapter for SpotifyConnector {
    fn service(&self) -> ServiceKind {
        ServiceKind::Spotify
    }

    #[instrument(skip(self))]
    async fn is_authenticated(&self) -> bool {
        match self.read::<CurrentUser>("/me", &[]).await {
            Ok(user) => {
                debug!(user = %user.id, "Spotify credentials valid");
                true
            }
            Err(e) => {
                warn!(error = %e, "Spotify authentication check failed");
                false
            }
        }
    }

    /// Spotify exposes no modification time, so snapshots are stamped with
    /// the time of the read.
    #[instrument(skip(self))]
    async fn get_playlist_snapshot(&self, name: &str) -> AdapterResult<Option<PlaylistSnapshot>> {
        let Some(playlist) = self.find_playlist(name).await? else {
            debug!("Spotify playlist does not exist");
            return Ok(None);
        };

        let tracks = self.list_tracks(&playlist.id).await?;
        let items = tracks.iter().map(Self::to_item);
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
        self.replace_uris(&playlist.id, &[]).await?;
        Ok(())
    }
}

/// Builds [`SpotifyConnector`]s sharing one OAuth token source.
pub struct SpotifyAdapterFactory {
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    token: Arc<dyn TokenSource>,
    read_retries: u32,
    item_timeout: Duration,
}

impl SpotifyAdapterFactory {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        credentials: &OAuthClientCredentials,
        read_retries: u32,
    ) -> Self {
        let token = OAuthTokenSource::spotify(credentials, http_client.clone(), clock.clone())
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

impl AdapterFactory for SpotifyAdapterFactory {
    fn service(&self) -> ServiceKind {
        ServiceKind::Spotify
    }

    fn build(&self, target: &SyncTarget) -> AdapterResult<Arc<dyn RemotePlaylistAdapter>> {
        let connector =
            SpotifyConnector::new(self.http_client.clone(), self.token.clone(), self.clock.clone())
                .with_bound_playlist(target.config.remote_playlist_id.clone())
                .with_read_policy(RetryPolicy::with_retries(self.read_retries))
                .with_item_timeout(self.item_timeout);

        Ok(Arc::new(connector))
    }
}
