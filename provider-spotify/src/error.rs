//! Error types for Spotify provider

use bridge_traits::BridgeError;
use core_auth::AuthError;
use core_sync::AdapterError;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Access token expired or revoked
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Throttled; `retry_after_secs` comes from the `Retry-After` header
    #[error("Rate limited by Spotify")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Spotify returned an error object
    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

impl SpotifyError {
    pub fn is_transient(&self) -> bool {
        match self {
            SpotifyError::RateLimited { .. } => true,
            SpotifyError::ApiError { status_code, .. } => (500..600).contains(status_code),
            SpotifyError::Bridge(e) => e.is_transient(),
            SpotifyError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<SpotifyError> for AdapterError {
    fn from(error: SpotifyError) -> Self {
        if error.is_transient() {
            return AdapterError::TransientNetwork(error.to_string());
        }

        match error {
            SpotifyError::AuthenticationFailed(msg) => AdapterError::Authentication(msg),
            SpotifyError::ApiError {
                status_code,
                message,
            } => AdapterError::Api {
                status: status_code,
                message,
            },
            SpotifyError::PlaylistNotFound(name) => AdapterError::NotFound(name),
            SpotifyError::Bridge(BridgeError::NotAvailable(msg)) => {
                AdapterError::Configuration(msg)
            }
            SpotifyError::Auth(e) => e.into(),
            other => AdapterError::Parse(other.to_string()),
        }
    }
}
