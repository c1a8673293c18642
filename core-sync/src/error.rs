use core_library::{LibraryError, PlaylistId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Playlist {playlist_id} not found")]
    PlaylistNotFound { playlist_id: PlaylistId },

    #[error("All {count} enabled sync targets failed to initialize")]
    AllTargetsFailed { count: usize },

    #[error("Invalid sync target: {0}")]
    InvalidTarget(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
