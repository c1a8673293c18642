use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is worth retrying (network level, not a bad request).
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. } | BridgeError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
