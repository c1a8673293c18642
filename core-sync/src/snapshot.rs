//! # Playlist Snapshot
//!
//! Point-in-time capture of a playlist's items, indexed for membership
//! checks by every identity key and by the normalized identity string.
//!
//! Within one snapshot each populated identity key belongs to one item.
//! Construction keeps the first item carrying a key and drops later items
//! that repeat it.

use chrono::{DateTime, Duration, Utc};
use core_library::{LocalPlaylist, PlaylistItem};
use similar::TextDiff;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct IdentityIndex {
    local_path: HashMap<String, usize>,
    youtube_url: HashMap<String, usize>,
    spotify_uri: HashMap<String, usize>,
    plex_rating_key: HashMap<String, usize>,
    identity: HashMap<String, usize>,
}

impl IdentityIndex {
    /// Positions of stored items sharing a key with `item`, in key priority
    /// order.
    fn key_hits(&self, item: &PlaylistItem) -> [Option<usize>; 4] {
        fn lookup(map: &HashMap<String, usize>, key: &Option<String>) -> Option<usize> {
            key.as_ref().and_then(|key| map.get(key).copied())
        }

        [
            lookup(&self.local_path, &item.local_path),
            lookup(&self.youtube_url, &item.youtube_url),
            lookup(&self.spotify_uri, &item.spotify_uri),
            lookup(&self.plex_rating_key, &item.plex_rating_key),
        ]
    }

    fn insert(&mut self, item: &PlaylistItem, position: usize) {
        fn put(map: &mut HashMap<String, usize>, key: &Option<String>, position: usize) {
            if let Some(key) = key {
                map.entry(key.clone()).or_insert(position);
            }
        }

        put(&mut self.local_path, &item.local_path, position);
        put(&mut self.youtube_url, &item.youtube_url, position);
        put(&mut self.spotify_uri, &item.spotify_uri, position);
        put(&mut self.plex_rating_key, &item.plex_rating_key, position);
        self.identity.entry(item.identity_key()).or_insert(position);
    }
}

/// Identity-indexed playlist capture.
#[derive(Debug, Clone)]
pub struct PlaylistSnapshot {
    name: String,
    last_updated: DateTime<Utc>,
    items: Vec<PlaylistItem>,
    index: IdentityIndex,
}

impl PlaylistSnapshot {
    /// Build a snapshot. `last_updated` is truncated to milliseconds.
    pub fn new(
        name: impl Into<String>,
        last_updated: DateTime<Utc>,
        items: impl IntoIterator<Item = PlaylistItem>,
    ) -> Self {
        let name = name.into();
        let mut kept = Vec::new();
        let mut index = IdentityIndex::default();
        let mut dropped = 0usize;

        for item in items {
            if index.key_hits(&item).iter().any(Option::is_some) {
                dropped += 1;
                continue;
            }
            index.insert(&item, kept.len());
            kept.push(item);
        }

        if dropped > 0 {
            debug!(snapshot = %name, dropped, "Dropped items repeating an identity key");
        }

        Self {
            name,
            last_updated: truncate_to_millis(last_updated),
            items: kept,
            index,
        }
    }

    /// Snapshot of a local playlist, named after it.
    pub fn from_local(playlist: &LocalPlaylist) -> Self {
        Self::new(&playlist.name, playlist.updated_at, playlist.items.iter().cloned())
    }

    /// The same capture under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The same capture dated at the latest one millisecond before `instant`.
    pub fn dated_before(&self, instant: DateTime<Utc>) -> Self {
        let ceiling = truncate_to_millis(instant) - Duration::milliseconds(1);
        Self {
            last_updated: self.last_updated.min(ceiling),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<PlaylistItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Membership by local path, YouTube URL, Spotify URI or Plex rating key
    /// (in that order), else by identity string.
    pub fn has(&self, item: &PlaylistItem) -> bool {
        self.index.key_hits(item).iter().any(Option::is_some)
            || self.index.identity.contains_key(&item.identity_key())
    }

    /// The stored item that is the same track as `item`.
    ///
    /// The earliest item sharing any identity key wins; otherwise the first
    /// item whose normalized artist and title both equal `item`'s.
    pub fn search_track(&self, item: &PlaylistItem) -> Option<&PlaylistItem> {
        self.index
            .key_hits(item)
            .into_iter()
            .flatten()
            .min()
            .or_else(|| self.index.identity.get(&item.identity_key()).copied())
            .map(|position| &self.items[position])
    }

    /// Identity strings in playlist order.
    pub fn identity_strings(&self) -> Vec<String> {
        self.items.iter().map(PlaylistItem::identity_key).collect()
    }

    /// Line-level unified diff from this snapshot to `other`, for audit logs.
    pub fn diff(&self, other: &PlaylistSnapshot) -> String {
        let old = lines(self);
        let new = lines(other);

        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .context_radius(2)
            .header(&self.name, &other.name)
            .to_string()
    }
}

fn lines(snapshot: &PlaylistSnapshot) -> String {
    let mut text = String::new();
    for identity in snapshot.identity_strings() {
        text.push_str(&identity);
        text.push('\n');
    }
    text
}

fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_dated_before_only_moves_timestamps_back() {
        let snapshot = PlaylistSnapshot::new("mix", at(10), vec![PlaylistItem::new("Queen", "Innuendo")]);

        let clamped = snapshot.dated_before(at(5));
        assert_eq!(clamped.last_updated(), at(5) - Duration::milliseconds(1));
        assert_eq!(clamped.len(), 1);

        assert_eq!(snapshot.dated_before(at(20)).last_updated(), at(10));
    }

    #[test]
    fn test_construction_drops_repeated_identity_keys() {
        let snapshot = PlaylistSnapshot::new(
            "mix",
            at(0),
            vec![
                PlaylistItem::new("A", "one").with_spotify_uri("spotify:track:1"),
                PlaylistItem::new("B", "two").with_spotify_uri("spotify:track:1"),
                PlaylistItem::new("C", "three"),
                PlaylistItem::new("C", "three"),
            ],
        );

        let titles: Vec<_> = snapshot.items().iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "three", "three"]);
    }

    #[test]
    fn test_has_checks_keys_then_identity_string() {
        let snapshot = PlaylistSnapshot::new(
            "mix",
            at(0),
            vec![
                PlaylistItem::new("Queen", "Innuendo").with_plex_rating_key("77"),
                PlaylistItem::new("The Beatles", "Hey Jude"),
            ],
        );

        assert!(snapshot.has(&PlaylistItem::new("x", "y").with_plex_rating_key("77")));
        assert!(snapshot.has(&PlaylistItem::new("Beatles", "Hey Jude (Remastered)")));
        // An unknown key still falls back to the identity string.
        assert!(snapshot.has(&PlaylistItem::new("Queen", "Innuendo").with_plex_rating_key("78")));
        assert!(!snapshot.has(&PlaylistItem::new("Abba", "Waterloo")));
    }

    #[test]
    fn test_search_track_prefers_earliest_key_match() {
        let snapshot = PlaylistSnapshot::new(
            "mix",
            at(0),
            vec![
                PlaylistItem::new("A", "one").with_youtube_url("yt:1"),
                PlaylistItem::new("B", "two").with_local_path("/b.flac"),
            ],
        );

        let query = PlaylistItem::new("?", "?")
            .with_local_path("/b.flac")
            .with_youtube_url("yt:1");
        assert_eq!(snapshot.search_track(&query).unwrap().title, "one");

        let by_name = PlaylistItem::new("b", "Two - Mono");
        assert_eq!(snapshot.search_track(&by_name).unwrap().title, "two");
        assert!(snapshot.search_track(&PlaylistItem::new("b", "three")).is_none());
    }

    #[test]
    fn test_last_updated_has_millisecond_precision() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let snapshot = PlaylistSnapshot::new("mix", precise, Vec::new());

        assert_eq!(snapshot.last_updated().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_diff_lists_changed_lines() {
        let before = PlaylistSnapshot::new(
            "baseline",
            at(0),
            vec![PlaylistItem::new("A", "one"), PlaylistItem::new("B", "two")],
        );
        let after = PlaylistSnapshot::new(
            "remote",
            at(1),
            vec![PlaylistItem::new("A", "one"), PlaylistItem::new("C", "three")],
        );

        let diff = before.diff(&after);
        assert!(diff.contains("--- baseline"));
        assert!(diff.contains("+++ remote"));
        assert!(diff.contains("-b - two"));
        assert!(diff.contains("+c - three"));
        assert!(before.diff(&before).is_empty());
    }
}
