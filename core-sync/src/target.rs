//! Sync target configuration

use core_auth::ServiceKind;
use core_library::PlaylistId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Unique identifier for a sync target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SyncTargetId(pub i64);

impl fmt::Display for SyncTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kinds of change may flow in which direction.
///
/// "Send" flags gate local changes pushed to the remote playlist, "receive"
/// flags gate remote changes applied to the local playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFlags {
    pub send_entry_adds: bool,
    pub send_entry_removals: bool,
    pub receive_entry_adds: bool,
    pub receive_entry_removals: bool,
}

impl SyncFlags {
    pub fn all() -> Self {
        Self {
            send_entry_adds: true,
            send_entry_removals: true,
            receive_entry_adds: true,
            receive_entry_removals: true,
        }
    }

    pub fn none() -> Self {
        Self {
            send_entry_adds: false,
            send_entry_removals: false,
            receive_entry_adds: false,
            receive_entry_removals: false,
        }
    }

    /// Push local state only.
    pub fn send_only() -> Self {
        Self {
            send_entry_adds: true,
            send_entry_removals: true,
            ..Self::none()
        }
    }

    /// Force push replaces the remote contents, so it needs both send flags.
    pub fn allows_force_push(&self) -> bool {
        self.send_entry_adds && self.send_entry_removals
    }
}

impl Default for SyncFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-target configuration map.
///
/// Known keys are typed; anything else, such as guardrail overrides, stays
/// in `settings` exactly as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Remote playlist name; defaults to the local playlist's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_playlist_name: Option<String>,

    /// Pre-existing remote playlist to bind to (Plex rating key, Spotify
    /// playlist ID or YouTube playlist ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_playlist_id: Option<String>,

    /// Name of the credential set to use when a service has several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl TargetConfig {
    pub fn named(remote_playlist_name: impl Into<String>) -> Self {
        Self {
            remote_playlist_name: Some(remote_playlist_name.into()),
            ..Self::default()
        }
    }

    pub fn with_remote_playlist_id(mut self, id: impl Into<String>) -> Self {
        self.remote_playlist_id = Some(id.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}

/// A remote mirror of one local playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTarget {
    pub id: SyncTargetId,
    pub playlist_id: PlaylistId,
    pub service: ServiceKind,
    pub config: TargetConfig,
    pub enabled: bool,
    pub flags: SyncFlags,
}

impl SyncTarget {
    /// Remote playlist name for a local playlist called `local_name`.
    pub fn remote_name(&self, local_name: &str) -> String {
        match &self.config.remote_playlist_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => local_name.to_string(),
        }
    }

    /// Label used in logs and reports.
    pub fn label(&self, local_name: &str) -> String {
        format!("{}:{}", self.service.as_str(), self.remote_name(local_name))
    }
}

/// Input for seeding a sync target
#[derive(Debug, Clone)]
pub struct NewSyncTarget {
    pub playlist_id: PlaylistId,
    pub service: ServiceKind,
    pub config: TargetConfig,
    pub enabled: bool,
    pub flags: SyncFlags,
}

impl NewSyncTarget {
    pub fn new(playlist_id: PlaylistId, service: ServiceKind) -> Self {
        Self {
            playlist_id,
            service,
            config: TargetConfig::default(),
            enabled: true,
            flags: SyncFlags::all(),
        }
    }

    pub fn with_config(mut self, config: TargetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_flags(mut self, flags: SyncFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
