//! Per-file metadata extraction.
//!
//! [`MetadataExtractor`] is the port the scanner enriches assets through.
//! [`LoftyExtractor`] implements it for local files using the lofty crate
//! (MP3, FLAC, OGG, M4A, WAV, ...). Extraction failures are per-file and
//! never fatal to a scan.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

use crate::model::Artwork;

/// Metadata pulled from a single file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_title: Option<String>,
    pub artwork: Option<Artwork>,
    /// Duration in milliseconds from the stream properties
    pub duration_ms: Option<u64>,
}

/// Metadata extraction failure for one file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    /// The file could not be opened or parsed
    #[error("Unreadable metadata for {uri}: {message}")]
    Unreadable { uri: String, message: String },

    /// The URI does not point at something this extractor can read
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// The extraction task died
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Reads title/artist/album/artwork for a playable URI.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, uri: &str) -> Result<ExtractedMetadata, MetadataError>;
}

/// Extractor for local files (`file://` URIs or plain paths).
#[derive(Debug, Clone, Default)]
pub struct LoftyExtractor {
    /// Skip embedded pictures (smaller catalogs, faster scans)
    pub skip_artwork: bool,
}

impl LoftyExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataExtractor for LoftyExtractor {
    async fn extract(&self, uri: &str) -> Result<ExtractedMetadata, MetadataError> {
        let path = path_from_uri(uri).ok_or_else(|| MetadataError::UnsupportedSource(uri.to_string()))?;
        let skip_artwork = self.skip_artwork;
        let owned_uri = uri.to_string();

        // lofty does blocking file I/O
        tokio::task::spawn_blocking(move || {
            read(&path, skip_artwork).map_err(|message| MetadataError::Unreadable {
                uri: owned_uri,
                message,
            })
        })
        .await
        .map_err(|e| MetadataError::Task(e.to_string()))?
    }
}

/// Map a `file://` URI or bare path to a filesystem path.
pub fn path_from_uri(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if uri.contains("://") {
        return None;
    }
    Some(PathBuf::from(uri))
}

/// Read tags and stream properties from a local file.
fn read(path: &Path, skip_artwork: bool) -> Result<ExtractedMetadata, String> {
    let tagged_file = Probe::open(path)
        .map_err(|e| format!("Failed to open file for probing: {}", e))?
        .read()
        .map_err(|e| format!("Failed to read file metadata: {}", e))?;

    // Get the primary tag, or fall back to the first available tag
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let title = tag.and_then(|t| t.title()).and_then(non_empty);
    let artist = tag.and_then(|t| t.artist()).and_then(non_empty);
    let album_title = tag.and_then(|t| t.album()).and_then(non_empty);

    let artwork = if skip_artwork {
        None
    } else {
        tag.and_then(|t| t.pictures().first()).map(|picture| Artwork::Embedded {
            mime_type: picture
                .mime_type()
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "image/jpeg".to_string()),
            data: picture.data().to_vec(),
        })
    };

    let duration = tagged_file.properties().duration();
    let duration_ms = (!duration.is_zero()).then(|| duration.as_millis() as u64);

    Ok(ExtractedMetadata {
        title,
        artist,
        album_title,
        artwork,
        duration_ms,
    })
}

fn non_empty(value: Cow<'_, str>) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
