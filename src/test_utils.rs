//! Test utilities and fixtures for music-pocket tests.
//!
//! Factories for tracks, catalogs, and device assets with predictable ids
//! and URIs, so tests can refer to `"track-3"` or `file:///music/a.mp3`
//! without building structs by hand.
//!
//! # Example
//!
//! ```ignore
//! use music_pocket::test_utils::{mock_catalog, mock_track};
//!
//! let catalog = mock_catalog(3);
//! assert_eq!(catalog.tracks[0], mock_track("track-0"));
//! ```

use crate::model::{Catalog, Track};
use crate::scanner::AudioAsset;

/// Fixed modification time used by every fixture (2024-01-01T00:00:00Z).
pub const MOCK_MODIFIED_MS: i64 = 1_704_067_200_000;

/// Creates a mock Track with sensible defaults.
///
/// Customize using struct update syntax:
///
/// ```ignore
/// let track = Track {
///     uri: String::new(),
///     ..mock_track("silent")
/// };
/// ```
pub fn mock_track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        filename: format!("{}.mp3", id),
        uri: format!("file:///music/{}.mp3", id),
        duration: Some(180_000),
        title: format!("Title {}", id),
        artist: "Test Artist".to_string(),
        album_title: Some("Test Album".to_string()),
        artwork: None,
        last_modified: MOCK_MODIFIED_MS,
    }
}

/// `count` tracks with ids `track-0`, `track-1`, ...
pub fn mock_tracks(count: usize) -> Vec<Track> {
    (0..count).map(|i| mock_track(&format!("track-{}", i))).collect()
}

/// Catalog holding [`mock_tracks`]`(count)`.
pub fn mock_catalog(count: usize) -> Catalog {
    Catalog {
        scan_duration_seconds: "0.1234".to_string(),
        tracks: mock_tracks(count),
        total_tracks: count,
    }
}

/// Device asset whose filename is `<id>.mp3`.
pub fn mock_asset(id: &str) -> AudioAsset {
    AudioAsset {
        id: id.to_string(),
        filename: format!("{}.mp3", id),
        uri: format!("file:///music/{}.mp3", id),
        duration_ms: Some(200_000),
        modification_time: Some(MOCK_MODIFIED_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_track_defaults() {
        let track = mock_track("abc");
        assert_eq!(track.id, "abc");
        assert_eq!(track.filename, "abc.mp3");
        assert!(track.uri.ends_with("/abc.mp3"));
        assert_eq!(track.duration, Some(180_000));
    }

    #[test]
    fn test_mock_catalog_ids() {
        let catalog = mock_catalog(3);
        let ids: Vec<&str> = catalog.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["track-0", "track-1", "track-2"]);
        assert_eq!(catalog.total_tracks, 3);
    }
}
