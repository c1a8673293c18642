//! Error types for YouTube provider

use bridge_traits::BridgeError;
use core_auth::AuthError;
use core_sync::AdapterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum YouTubeError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Daily quota used up; retrying before the reset is pointless
    #[error("YouTube quota exceeded")]
    QuotaExceeded,

    #[error("YouTube API error (status {status_code}): {message}")]
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

pub type Result<T> = std::result::Result<T, YouTubeError>;

impl YouTubeError {
    pub fn is_transient(&self) -> bool {
        match self {
            YouTubeError::ApiError { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            YouTubeError::Bridge(e) => e.is_transient(),
            YouTubeError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<YouTubeError> for AdapterError {
    fn from(error: YouTubeError) -> Self {
        if error.is_transient() {
            return AdapterError::TransientNetwork(error.to_string());
        }

        match error {
            YouTubeError::AuthenticationFailed(msg) => AdapterError::Authentication(msg),
            YouTubeError::QuotaExceeded => AdapterError::Api {
                status: 403,
                message: "quota exceeded".to_string(),
            },
            YouTubeError::ApiError {
                status_code,
                message,
            } => AdapterError::Api {
                status: status_code,
                message,
            },
            YouTubeError::PlaylistNotFound(name) => AdapterError::NotFound(name),
            YouTubeError::Bridge(BridgeError::NotAvailable(msg)) => {
                AdapterError::Configuration(msg)
            }
            YouTubeError::Auth(e) => e.into(),
            other => AdapterError::Parse(other.to_string()),
        }
    }
}
