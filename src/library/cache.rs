//! Persisted catalog snapshot.
//!
//! The whole catalog lives under one key as a single JSON record stamped
//! with a write time and a schema version. A record is either fully trusted
//! or ignored: version mismatch, age past the expiry window, or any parse
//! failure all read as a miss.
//!
//! Writes are best-effort. When the store reports it is full, non-essential
//! keys are evicted and a smaller, trimmed record is tried once; if that
//! fails too, caching is skipped for this catalog.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::model::{CachedCatalog, Catalog, Track};
use crate::storage::{KeyValueStore, StorageError};

/// Key of the catalog record.
pub const CACHE_KEY: &str = "cached_audio_tracks";

/// Bump to invalidate every previously written record.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Keys that survive eviction: the catalog itself and user/settings data.
pub fn is_essential_key(key: &str) -> bool {
    key == CACHE_KEY || key.contains("user_") || key.contains("settings_")
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Versioned, expiring catalog cache on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct TrackCacheStore {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl TrackCacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Load the cached catalog, `None` on miss, stale, or unreadable record.
    pub async fn load(&self) -> Option<CachedCatalog> {
        let raw = match self.store.get(CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(target: "catalog::cache", "No cached catalog");
                return None;
            }
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Failed to read cached catalog");
                return None;
            }
        };

        let cached: CachedCatalog = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Discarding unreadable cache record");
                return None;
            }
        };

        if cached.version != CACHE_SCHEMA_VERSION {
            info!(
                target: "catalog::cache",
                found = cached.version,
                expected = CACHE_SCHEMA_VERSION,
                "Discarding cache record from another schema version"
            );
            return None;
        }

        let age_ms = now_ms() - cached.cache_timestamp;
        if age_ms > self.expiry_ms() {
            info!(target: "catalog::cache", age_ms, "Discarding expired cache record");
            return None;
        }

        debug!(
            target: "catalog::cache",
            tracks = cached.catalog.tracks.len(),
            age_ms,
            "Loaded cached catalog"
        );
        Some(cached)
    }

    /// Persist a catalog. Never fails; storage problems are logged.
    pub async fn save(&self, catalog: &Catalog) {
        let kept = catalog.tracks.len().min(self.config.max_cached_tracks);
        let tracks = catalog.tracks[..kept].to_vec();

        let Some(payload) = self.encode(catalog, tracks) else {
            return;
        };

        match self.store.set(CACHE_KEY, &payload).await {
            Ok(()) => {
                debug!(target: "catalog::cache", tracks = kept, bytes = payload.len(), "Saved catalog to cache");
            }
            Err(e) if e.is_storage_full() => {
                warn!(target: "catalog::cache", error = %e, "Storage full, attempting to clear space");
                self.save_reduced(catalog, kept).await;
            }
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Failed to save catalog to cache");
            }
        }
    }

    /// Remove only the catalog record.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(CACHE_KEY).await?;
        info!(target: "catalog::cache", "Track cache cleared");
        Ok(())
    }

    /// Remove every persisted key (explicit reset or severe storage recovery).
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        self.store.clear().await?;
        info!(target: "catalog::cache", "All persisted data cleared");
        Ok(())
    }

    /// Preventive cleanup: once the store holds more keys than the
    /// configured threshold, evict the non-essential ones.
    ///
    /// Returns how many keys were removed. Best-effort.
    pub async fn check_and_cleanup_storage(&self) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Storage check failed");
                return 0;
            }
        };
        if keys.len() <= self.config.cleanup_key_threshold {
            return 0;
        }

        info!(target: "catalog::cache", keys = keys.len(), "Storage contains many items, performing preventive cleanup");
        match self.evict_non_essential(keys).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Preventive cleanup failed");
                0
            }
        }
    }

    /// Second tier of the storage-full path: evict, then write a trimmed record.
    async fn save_reduced(&self, catalog: &Catalog, kept: usize) {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!(target: "catalog::cache", error = %e, "Failed to recover storage space");
                return;
            }
        };

        let removed = match self.evict_non_essential(keys).await {
            Ok(0) => {
                warn!(target: "catalog::cache", "No non-essential items to remove; catalog not cached");
                return;
            }
            Ok(removed) => removed,
            Err(e) => {
                error!(target: "catalog::cache", error = %e, "Failed to recover storage space");
                return;
            }
        };
        info!(target: "catalog::cache", removed, "Removed cached items to free space");

        let reduced: Vec<Track> = catalog
            .tracks
            .iter()
            .take(kept.min(self.config.reduced_cached_tracks))
            .map(Track::trimmed)
            .collect();
        let count = reduced.len();
        let Some(payload) = self.encode(catalog, reduced) else {
            return;
        };

        match self.store.set(CACHE_KEY, &payload).await {
            Ok(()) => info!(target: "catalog::cache", tracks = count, "Saved reduced catalog to cache"),
            Err(e) => error!(target: "catalog::cache", error = %e, "Reduced catalog did not fit either; skipping cache"),
        }
    }

    async fn evict_non_essential(&self, keys: Vec<String>) -> Result<usize, StorageError> {
        let removable: Vec<String> = keys.into_iter().filter(|k| !is_essential_key(k)).collect();
        if removable.is_empty() {
            return Ok(0);
        }
        self.store.multi_remove(&removable).await?;
        Ok(removable.len())
    }

    /// Serialize a record holding `tracks` out of `catalog`.
    fn encode(&self, catalog: &Catalog, tracks: Vec<Track>) -> Option<String> {
        let record = CachedCatalog {
            catalog: Catalog {
                scan_duration_seconds: catalog.scan_duration_seconds.clone(),
                tracks,
                total_tracks: catalog.tracks.len(),
            },
            cache_timestamp: now_ms(),
            version: CACHE_SCHEMA_VERSION,
        };
        match serde_json::to_string(&record) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(target: "catalog::cache", error = %e, "Failed to serialize catalog");
                None
            }
        }
    }

    fn expiry_ms(&self) -> i64 {
        i64::from(self.config.expiry_days) * DAY_MS
    }
}
