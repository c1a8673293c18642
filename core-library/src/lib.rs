//! # Local Playlist Library
//!
//! Owns the local side of playlist mirroring: the SQLite schema, the
//! playlist store the sync engine reads and writes, and the track matching
//! rules every component shares.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite connection pooling and migrations ([`db`])
//! - Title and artist normalization plus match scoring ([`matching`])
//! - Playlist items, entries and library rows ([`models`])
//! - The local playlist store and sparse entry ordering ([`repositories`])

pub mod db;
pub mod error;
pub mod matching;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{LocalPlaylist, PlaylistId, PlaylistItem};
