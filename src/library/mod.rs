//! Track catalog: device scan, persisted snapshot, and the service that
//! ties them together.
//!
//! Callers go through [`TrackCatalogService`]; the scanner and the cache
//! store are its collaborators.

pub mod cache;
pub mod scan;
pub mod service;

pub use cache::{CACHE_KEY, CACHE_SCHEMA_VERSION, TrackCacheStore};
pub use scan::DeviceTrackScanner;
pub use service::TrackCatalogService;

use crate::storage::StorageError;

/// Failure that blocks producing a catalog at all.
///
/// Per-file metadata problems and cache write failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Permission to read audio files was not granted")]
    PermissionDenied,

    #[error("Failed to list audio files: {0}")]
    Listing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
