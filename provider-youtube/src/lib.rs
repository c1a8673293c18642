//! # YouTube Provider
//!
//! Implements `RemotePlaylistAdapter` for the YouTube Data API v3.
//!
//! Playlist entries are videos. Artist and title are recovered from the
//! video title ("Artist - Title") or, for auto-generated music uploads,
//! from the "<Artist> - Topic" channel name. Items are inserted and
//! deleted one request at a time; the API has no batch endpoint.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{video_id_from_url, video_url, YouTubeAdapterFactory, YouTubeConnector};
pub use error::{Result, YouTubeError};
