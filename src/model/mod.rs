//! Core data models for the track catalog.
//!
//! Defines [`Track`], the scanned [`Catalog`], its persisted form
//! [`CachedCatalog`], and the playback [`RepeatMode`].
//!
//! # Wire format
//!
//! The serde representation of these types *is* the persisted cache record:
//! camelCase field names, catalog scan time stored as `duration`, and
//! artwork re-encoded as text (see [`Artwork`]).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Artist shown when metadata extraction fails or is skipped.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Title shown when neither tags nor the filename give one.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// A playable entry in the catalog.
///
/// Tracks are immutable once created and only replaced by a fresh scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable identifier from the device asset store (unique key)
    pub id: String,
    /// File name as reported by the asset store
    pub filename: String,
    /// Location the platform audio service can play
    pub uri: String,
    /// Duration in milliseconds, if known
    #[serde(default)]
    pub duration: Option<u64>,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album_title: Option<String>,
    /// Embedded artwork, if any
    #[serde(default, rename = "artworkData")]
    pub artwork: Option<Artwork>,
    /// Modification time (epoch ms), display and sorting only
    #[serde(default)]
    pub last_modified: i64,
}

impl Track {
    /// Copy with only the fields needed to list and play the track.
    ///
    /// Used for the reduced cache record written under storage pressure.
    pub fn trimmed(&self) -> Self {
        let title = if self.title.is_empty() {
            self.filename.clone()
        } else {
            self.title.clone()
        };
        Self {
            id: self.id.clone(),
            filename: self.filename.clone(),
            uri: self.uri.clone(),
            duration: None,
            title,
            artist: self.artist.clone(),
            album_title: None,
            artwork: None,
            last_modified: 0,
        }
    }

    /// Display album, falling back to "Unknown Album".
    pub fn display_album(&self) -> &str {
        self.album_title.as_deref().unwrap_or("Unknown Album")
    }
}

/// Derive a display title from a file name by dropping its extension.
///
/// `"song.mp3"` becomes `"song"`; names that reduce to nothing become
/// [`UNKNOWN_TITLE`].
pub fn title_from_filename(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(dot) if dot + 1 < filename.len() && !filename[dot + 1..].contains('/') => {
            &filename[..dot]
        }
        _ => filename,
    };
    if stem.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        stem.to_string()
    }
}

/// Embedded image attached to a track.
///
/// Persisted as a single string: URIs verbatim, blobs as a base64 `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artwork {
    /// Reference the platform can resolve on its own
    Uri(String),
    /// Raw image bytes pulled from the file's tags
    Embedded { mime_type: String, data: Vec<u8> },
}

impl Artwork {
    /// Encode into the cache-safe text form.
    pub fn to_text(&self) -> String {
        match self {
            Artwork::Uri(uri) => uri.clone(),
            Artwork::Embedded { mime_type, data } => {
                format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
            }
        }
    }

    /// Decode from the cache-safe text form.
    ///
    /// A base64 `data:` URI always decodes to [`Artwork::Embedded`], even
    /// when it was stored as [`Artwork::Uri`]. Both name the same bytes and
    /// re-encode to the same text, so only the variant changes.
    pub fn from_text(text: &str) -> Result<Self, base64::DecodeError> {
        let Some(rest) = text.strip_prefix("data:") else {
            return Ok(Artwork::Uri(text.to_string()));
        };
        match rest.split_once(";base64,") {
            Some((mime_type, encoded)) => Ok(Artwork::Embedded {
                mime_type: mime_type.to_string(),
                data: STANDARD.decode(encoded)?,
            }),
            None => Ok(Artwork::Uri(text.to_string())),
        }
    }
}

impl Serialize for Artwork {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Artwork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Artwork::from_text(&text).map_err(serde::de::Error::custom)
    }
}

/// The full set of tracks discovered by one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Wall-clock scan time in seconds, 4 decimals
    #[serde(rename = "duration")]
    pub scan_duration_seconds: String,
    /// Tracks, unique by id
    pub tracks: Vec<Track>,
    /// Number of tracks the scan produced (may exceed `tracks` when cached)
    pub total_tracks: usize,
}

/// A catalog snapshot as persisted by the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCatalog {
    #[serde(flatten)]
    pub catalog: Catalog,
    /// When the record was written (epoch ms)
    pub cache_timestamp: i64,
    /// Schema version the record was written with
    pub version: u32,
}

/// What happens when the active track finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Replay the current track
    Track,
    /// Wrap around to the start of the playlist
    Queue,
}

impl RepeatMode {
    /// Next mode in the control-button cycle: Off → Track → Queue → Off.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Off,
        }
    }
}

/// Format a millisecond duration as M:SS or H:MM:SS.
///
/// Unknown or zero durations render as `--:--`.
pub fn format_duration(millis: Option<u64>) -> String {
    let Some(millis) = millis.filter(|&m| m > 0) else {
        return "--:--".to_string();
    };
    let secs = millis / 1000;
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
