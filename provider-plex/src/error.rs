//! Error types for Plex provider

use bridge_traits::BridgeError;
use core_auth::AuthError;
use core_sync::AdapterError;
use thiserror::Error;

/// Plex provider errors
#[derive(Error, Debug)]
pub enum PlexError {
    /// The server rejected the token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Plex API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// No audio playlist with the given title or rating key
    #[error("Playlist not found: {0}")]
    PlaylistNotFound(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Result type for Plex operations
pub type Result<T> = std::result::Result<T, PlexError>;

impl PlexError {
    /// Throttling, server errors and network failures.
    pub fn is_transient(&self) -> bool {
        match self {
            PlexError::ApiError { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            PlexError::Bridge(e) => e.is_transient(),
            PlexError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<PlexError> for AdapterError {
    fn from(error: PlexError) -> Self {
        if error.is_transient() {
            return AdapterError::TransientNetwork(error.to_string());
        }

        match error {
            PlexError::AuthenticationFailed(msg) => AdapterError::Authentication(msg),
            PlexError::ApiError {
                status_code,
                message,
            } => AdapterError::Api {
                status: status_code,
                message,
            },
            PlexError::PlaylistNotFound(name) => AdapterError::NotFound(name),
            PlexError::ParseError(msg) => AdapterError::Parse(msg),
            PlexError::Bridge(BridgeError::NotAvailable(msg)) => AdapterError::Configuration(msg),
            PlexError::Bridge(e) => AdapterError::Parse(e.to_string()),
            PlexError::Auth(e) => e.into(),
        }
    }
}
