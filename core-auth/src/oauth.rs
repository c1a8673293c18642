//! OAuth 2.0 refresh-token grant.
//!
//! The core never runs an authorization-code flow. Hosts obtain a refresh
//! token once and hand it over through
//! [`OAuthClientCredentials`](core_runtime::config::OAuthClientCredentials);
//! [`OAuthTokenSource`] exchanges it for access tokens on demand.
//!
//! ## Retry behaviour
//!
//! - 5xx and transport failures are retried with exponential backoff
//! - 400/401 mean the refresh token or client registration is bad and are
//!   reported as [`AuthError::AuthenticationFailed`] without retrying

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::time::Clock;
use core_runtime::config::OAuthClientCredentials;
use core_runtime::logging::redact_if_sensitive;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::token::TokenSource;
use crate::types::{OAuthTokens, ServiceKind};

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh tokens this many seconds before they expire.
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Token endpoint plus the client registration used against it.
#[derive(Clone)]
pub struct OAuthEndpoint {
    pub service: ServiceKind,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthEndpoint")
            .field("service", &self.service)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Access tokens minted from a refresh token and cached until shortly before
/// they expire.
pub struct OAuthTokenSource {
    endpoint: OAuthEndpoint,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    refresh_token: Mutex<String>,
    cached: Mutex<Option<OAuthTokens>>,
}

impl OAuthTokenSource {
    pub fn new(
        endpoint: OAuthEndpoint,
        refresh_token: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint,
            http_client,
            clock,
            retry_policy: RetryPolicy::default(),
            refresh_token: Mutex::new(refresh_token.into()),
            cached: Mutex::new(None),
        }
    }

    /// Token source for the Spotify accounts service.
    pub fn spotify(
        credentials: &OAuthClientCredentials,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::for_service(ServiceKind::Spotify, SPOTIFY_TOKEN_URL, credentials, http_client, clock)
    }

    /// Token source for Google (YouTube Data API).
    pub fn youtube(
        credentials: &OAuthClientCredentials,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::for_service(ServiceKind::YouTube, GOOGLE_TOKEN_URL, credentials, http_client, clock)
    }

    fn for_service(
        service: ServiceKind,
        token_url: &str,
        credentials: &OAuthClientCredentials,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let endpoint = OAuthEndpoint {
            service,
            token_url: token_url.to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        };
        Self::new(endpoint, credentials.refresh_token.clone(), http_client, clock)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Exchange the refresh token for a fresh token set.
    #[instrument(skip(self, refresh_token), fields(service = %self.endpoint.service))]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.endpoint.client_id.as_str()),
            ("client_secret", self.endpoint.client_secret.as_str()),
        ];
        let request = HttpRequest::new(HttpMethod::Post, self.endpoint.token_url.clone())
            .form(&params)?;

        debug!("Refreshing access token");

        let mut attempt = 0;
        loop {
            attempt += 1;

            let response = match self.http_client.execute(request.clone()).await {
                Ok(response) => response,
                Err(e) if e.is_transient() && attempt < self.retry_policy.max_attempts => {
                    warn!(error = %e, attempt, "Token endpoint unreachable, retrying");
                    sleep(self.retry_policy.delay_for(attempt - 1)).await;
                    continue;
                }
                Err(e) => return Err(AuthError::Transport(e)),
            };

            if response.is_success() {
                let token_response: TokenResponse = response.json().map_err(|e| {
                    AuthError::TokenRefreshFailed(format!("Failed to parse token response: {}", e))
                })?;

                info!(
                    expires_in = token_response.expires_in,
                    "Refreshed access token"
                );

                return Ok(OAuthTokens::new(
                    token_response.access_token,
                    token_response
                        .refresh_token
                        .unwrap_or_else(|| refresh_token.to_string()),
                    self.clock.now(),
                    token_response.expires_in,
                ));
            }

            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            if status == 400 || status == 401 {
                warn!(status, error = %error_body, "Refresh token rejected");
                return Err(AuthError::AuthenticationFailed {
                    service: self.endpoint.service.display_name().to_string(),
                    reason: format!("token endpoint returned {}: {}", status, error_body),
                });
            }

            if !response.is_retryable() || attempt >= self.retry_policy.max_attempts {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token endpoint returned {} after {} attempts: {}",
                    status, attempt, error_body
                )));
            }

            let delay = self.retry_policy.delay_for(attempt - 1);
            warn!(
                status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    fn service(&self) -> ServiceKind {
        self.endpoint.service
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(tokens) = cached.as_ref() {
            if !tokens.is_expired_with_buffer(self.clock.now(), TOKEN_REFRESH_BUFFER_SECS) {
                return Ok(tokens.access_token.clone());
            }
        }

        let mut refresh_token = self.refresh_token.lock().await;
        let tokens = self.refresh_access_token(&refresh_token).await?;

        if tokens.refresh_token != *refresh_token {
            debug!(
                refresh_token = %redact_if_sensitive("refresh_token", &tokens.refresh_token),
                "Provider rotated refresh token"
            );
            *refresh_token = tokens.refresh_token.clone();
        }

        let access_token = tokens.access_token.clone();
        *cached = Some(tokens);
        Ok(access_token)
    }

    async fn invalidate(&self) {
        debug!(service = %self.endpoint.service, "Invalidating cached access token");
        self.cached.lock().await.take();
    }
}
