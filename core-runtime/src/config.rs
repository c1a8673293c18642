//! # Core Configuration Module
//!
//! Provides configuration management for the Playlist Mirror Core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every capability and tuning knob the sync engine reads.
//! Validation is fail-fast: a config that would make a sync round misbehave
//! (zero timeout, an ordering step too small to bisect) never gets built.
//!
//! ## Dependencies
//!
//! - `HttpClient` - required; the desktop default (reqwest) is injected when
//!   the `desktop-shims` feature is enabled
//! - `Clock` - optional; defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PlexCredentials, SyncOptions};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/pmc/playlists.db")
//!     .sync_options(SyncOptions::default().with_adapter_timeout(Duration::from_secs(20)))
//!     .plex(PlexCredentials::new("http://127.0.0.1:32400", "plex-token"))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing capabilities surface as [`Error::CapabilityMissing`] with a message
//! naming the fix; invalid values surface as [`Error::Config`], and unusable
//! service credentials as [`Error::Credentials`].

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default gap between consecutive playlist entry order keys.
pub const DEFAULT_ORDER_STEP: i64 = 100;

/// Default maximum length of a persisted baseline name.
pub const DEFAULT_BASELINE_NAME_MAX_LEN: usize = 100;

/// Core configuration for the Playlist Mirror Core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client used by every remote adapter
    pub http_client: Arc<dyn HttpClient>,

    /// Time source for snapshot timestamps
    pub clock: Arc<dyn Clock>,

    /// Sync engine tuning
    pub sync: SyncOptions,

    /// Credentials for the remote services
    pub credentials: ServiceCredentials,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("sync", &self.sync)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Tuning for sync rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for one remote step: a snapshot read, one item lookup,
    /// or one change of a batch write (a batch of N changes gets N times this)
    pub adapter_timeout: Duration,

    /// Retries for idempotent reads after the first attempt
    pub read_retries: u32,

    /// Gap used when appending or rebalancing playlist entries
    pub order_step: i64,

    /// Baseline names are truncated to this many characters
    pub baseline_name_max_len: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
            read_retries: 2,
            order_step: DEFAULT_ORDER_STEP,
            baseline_name_max_len: DEFAULT_BASELINE_NAME_MAX_LEN,
        }
    }
}

impl SyncOptions {
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn with_order_step(mut self, step: i64) -> Self {
        self.order_step = step;
        self
    }

    pub fn with_baseline_name_max_len(mut self, len: usize) -> Self {
        self.baseline_name_max_len = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.adapter_timeout.is_zero() {
            return Err(Error::Config(
                "Adapter timeout must be greater than zero".to_string(),
            ));
        }

        if self.adapter_timeout > Duration::from_secs(600) {
            return Err(Error::Config(
                "Adapter timeout exceeds maximum of 10 minutes".to_string(),
            ));
        }

        if self.read_retries > 5 {
            return Err(Error::Config(
                "Read retries exceed maximum of 5".to_string(),
            ));
        }

        // A step of 1 leaves no room for a midpoint between neighbours.
        if self.order_step < 2 {
            return Err(Error::Config(
                "Order step must be at least 2".to_string(),
            ));
        }

        if self.baseline_name_max_len < 16 {
            return Err(Error::Config(
                "Baseline name length must be at least 16 characters".to_string(),
            ));
        }

        Ok(())
    }
}

/// Plex server access.
#[derive(Clone, PartialEq, Eq)]
pub struct PlexCredentials {
    /// Server base URL, e.g. `http://127.0.0.1:32400`
    pub base_url: String,
    pub token: String,
}

impl PlexCredentials {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for PlexCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlexCredentials")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// OAuth client registration plus a long-lived refresh token.
///
/// The authorization-code flow that produced the refresh token happens
/// outside the core; only the refresh grant runs here.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl OAuthClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for OAuthClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Credentials per remote service. A service without credentials cannot be
/// the target of a sync; targets pointing at it fail initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCredentials {
    pub plex: Option<PlexCredentials>,
    pub spotify: Option<OAuthClientCredentials>,
    pub youtube: Option<OAuthClientCredentials>,
}

impl ServiceCredentials {
    pub fn validate(&self) -> Result<()> {
        if let Some(plex) = &self.plex {
            if !(plex.base_url.starts_with("http://") || plex.base_url.starts_with("https://")) {
                return Err(Error::Credentials {
                    service: "Plex".to_string(),
                    reason: format!(
                        "base URL must start with http:// or https://, got '{}'",
                        plex.base_url
                    ),
                });
            }
            if plex.token.is_empty() {
                return Err(Error::Credentials {
                    service: "Plex".to_string(),
                    reason: "token cannot be empty".to_string(),
                });
            }
        }

        for (service, creds) in [("Spotify", &self.spotify), ("YouTube", &self.youtube)] {
            if let Some(creds) = creds {
                if creds.client_id.is_empty() || creds.refresh_token.is_empty() {
                    return Err(Error::Credentials {
                        service: service.to_string(),
                        reason: "a client id and a refresh token are required".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.sync.validate()?;
        self.credentials.validate()
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::HttpClient(format!("default reqwest client: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject an HttpClient with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    sync: Option<SyncOptions>,
    credentials: ServiceCredentials,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/playlists.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the clock. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn sync_options(mut self, options: SyncOptions) -> Self {
        self.sync = Some(options);
        self
    }

    pub fn plex(mut self, credentials: PlexCredentials) -> Self {
        self.credentials.plex = Some(credentials);
        self
    }

    pub fn spotify(mut self, credentials: OAuthClientCredentials) -> Self {
        self.credentials.spotify = Some(credentials);
        self
    }

    pub fn youtube(mut self, credentials: OAuthClientCredentials) -> Self {
        self.credentials.youtube = Some(credentials);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the database path is missing or a value is invalid
    /// - [`Error::Credentials`] when a service's credentials are incomplete
    /// - [`Error::CapabilityMissing`] when no HTTP client is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_path,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sync: self.sync.unwrap_or_default(),
            credentials: self.credentials,
        };

        config.validate()?;

        Ok(config)
    }
}
