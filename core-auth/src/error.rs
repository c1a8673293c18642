use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{service} authentication failed: {reason}")]
    AuthenticationFailed { service: String, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No credentials configured for {0}")]
    MissingCredentials(String),

    #[error("Unknown service: {0}")]
    InvalidService(String),

    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] BridgeError),
}

impl AuthError {
    /// Transport failures may succeed on a later attempt; everything else
    /// needs the credentials fixed first.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
