//! Device audio enumeration.
//!
//! [`MediaLibrary`] is the port over the platform's asset store: a
//! permission gate plus paged listing keyed by an opaque cursor. Hosts cap
//! how many assets one request may return, so callers walk pages until
//! [`AssetPage::has_next_page`] is false.
//!
//! [`FsMediaLibrary`] implements the port over local directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Supported extensions (lowercase).
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "aac", "opus"];

/// One audio asset as the device reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    /// Stable identifier in the asset store
    pub id: String,
    pub filename: String,
    pub uri: String,
    /// Duration in milliseconds, when the store knows it
    pub duration_ms: Option<u64>,
    /// Modification time (epoch ms), when the store knows it
    pub modification_time: Option<i64>,
}

/// Result of asking for audio-read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionStatus {
    pub granted: bool,
    /// Whether asking again could change the answer
    pub can_ask_again: bool,
}

/// Request for one page of assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of assets to return
    pub first: usize,
    /// Cursor returned by the previous page (`None` for the first page)
    pub after: Option<String>,
}

/// One page of assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPage {
    pub assets: Vec<AudioAsset>,
    /// Cursor to pass as `after` for the next page
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    /// Total assets available, if the store reports it
    pub total_count: Option<usize>,
}

/// Asset listing failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListError {
    #[error("Invalid page cursor: {0}")]
    InvalidCursor(String),

    #[error("Asset store error: {0}")]
    Store(String),
}

/// Platform asset store.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Ask for permission to read audio assets.
    async fn request_permission(&self) -> Result<PermissionStatus, ListError>;

    /// List one page of audio assets.
    async fn list_audio_assets(&self, page: PageRequest) -> Result<AssetPage, ListError>;
}

/// Check whether a path has a supported audio extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Stable asset id for a file path.
fn asset_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest[..12].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Media library over local directories.
///
/// The first page request walks every root and snapshots the result;
/// following pages slice that snapshot, so a listing is consistent even if
/// files change mid-scan. Cursors are offsets into the snapshot.
pub struct FsMediaLibrary {
    roots: Vec<PathBuf>,
    snapshot: Mutex<Arc<Vec<AudioAsset>>>,
}

impl FsMediaLibrary {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            snapshot: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Walk every root for audio files, sorted by path.
    fn walk(roots: &[PathBuf]) -> Vec<AudioAsset> {
        let mut paths: Vec<PathBuf> = roots
            .iter()
            .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
            .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();
        paths.dedup();

        paths
            .into_iter()
            .map(|path| {
                let modification_time = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64);
                AudioAsset {
                    id: asset_id(&path),
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    uri: format!("file://{}", path.display()),
                    duration_ms: None,
                    modification_time,
                }
            })
            .collect()
    }
}

#[async_trait]
impl MediaLibrary for FsMediaLibrary {
    async fn request_permission(&self) -> Result<PermissionStatus, ListError> {
        let roots = self.roots.clone();
        let denied = tokio::task::spawn_blocking(move || {
            roots.iter().any(|root| {
                matches!(
                    std::fs::read_dir(root),
                    Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied
                )
            })
        })
        .await
        .map_err(|e| ListError::Store(e.to_string()))?;

        Ok(PermissionStatus {
            granted: !denied,
            can_ask_again: false,
        })
    }

    async fn list_audio_assets(&self, page: PageRequest) -> Result<AssetPage, ListError> {
        let offset = match &page.after {
            None => {
                let roots = self.roots.clone();
                let assets = tokio::task::spawn_blocking(move || Self::walk(&roots))
                    .await
                    .map_err(|e| ListError::Store(e.to_string()))?;
                *self.snapshot.lock() = Arc::new(assets);
                0
            }
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| ListError::InvalidCursor(cursor.clone()))?,
        };

        let snapshot = self.snapshot.lock().clone();
        let end = offset.saturating_add(page.first).min(snapshot.len());
        let assets = snapshot.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();

        Ok(AssetPage {
            assets,
            end_cursor: Some(end.to_string()),
            has_next_page: end < snapshot.len(),
            total_count: Some(snapshot.len()),
        })
    }
}

/// Mock media library for testing.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves predefined pages; cursors are page numbers.
    pub struct MockMediaLibrary {
        pub granted: bool,
        pub pages: Vec<Vec<AudioAsset>>,
        /// Error to return from listing (takes precedence over pages)
        pub error: Option<ListError>,
        list_calls: AtomicUsize,
    }

    impl MockMediaLibrary {
        /// Library that grants permission and serves `pages`.
        pub fn with_pages(pages: Vec<Vec<AudioAsset>>) -> Self {
            Self {
                granted: true,
                pages,
                error: None,
                list_calls: AtomicUsize::new(0),
            }
        }

        /// Library that refuses permission.
        pub fn denied() -> Self {
            Self {
                granted: false,
                ..Self::with_pages(vec![])
            }
        }

        /// Number of page requests served so far.
        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaLibrary for MockMediaLibrary {
        async fn request_permission(&self) -> Result<PermissionStatus, ListError> {
            Ok(PermissionStatus {
                granted: self.granted,
                can_ask_again: !self.granted,
            })
        }

        async fn list_audio_assets(&self, page: PageRequest) -> Result<AssetPage, ListError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            let index = match page.after {
                None => 0,
                Some(cursor) => cursor
                    .parse::<usize>()
                    .map_err(|_| ListError::InvalidCursor(cursor))?,
            };
            let assets = self.pages.get(index).cloned().unwrap_or_default();
            Ok(AssetPage {
                assets,
                end_cursor: Some((index + 1).to_string()),
                has_next_page: index + 1 < self.pages.len(),
                total_count: Some(self.pages.iter().map(Vec::len).sum()),
            })
        }
    }
}
