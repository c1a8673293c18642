//! # Plex Provider
//!
//! Implements `RemotePlaylistAdapter` for audio playlists on a Plex Media
//! Server.
//!
//! ## Overview
//!
//! This module provides:
//! - Playlist lookup by title, or binding to a known playlist rating key
//! - Track resolution through the server's library search
//! - Batched playlist writes (100 rating keys per request)
//! - Retries with exponential backoff for reads

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{PlexAdapterFactory, PlexConnector};
pub use error::{PlexError, Result};
