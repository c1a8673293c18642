//! # Spotify Provider
//!
//! Implements `RemotePlaylistAdapter` for the Spotify Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Playlist lookup by name among the user's playlists, or by bound ID
//! - Paged track listing and batched adds and removals (100 URIs per call)
//! - Track search for items without a Spotify URI
//! - OAuth 2.0 access through `core_auth::OAuthTokenSource`

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{SpotifyAdapterFactory, SpotifyConnector};
pub use error::{Result, SpotifyError};
