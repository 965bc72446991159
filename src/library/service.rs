//! Catalog orchestration: cache first, scan on miss.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CatalogError, DeviceTrackScanner, TrackCacheStore};
use crate::model::Catalog;

/// Single entry point for the track catalog.
///
/// At most one scan-and-save cycle runs at a time: concurrent
/// [`get_tracks`](Self::get_tracks) callers queue on a gate and the later
/// ones are served from the cache the first one wrote.
pub struct TrackCatalogService {
    cache: TrackCacheStore,
    scanner: DeviceTrackScanner,
    gate: Mutex<()>,
    current: RwLock<Option<Arc<Catalog>>>,
}

impl TrackCatalogService {
    pub fn new(cache: TrackCacheStore, scanner: DeviceTrackScanner) -> Self {
        Self {
            cache,
            scanner,
            gate: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    /// Return the cached catalog, or scan and cache a fresh one.
    pub async fn get_tracks(&self) -> Result<Arc<Catalog>, CatalogError> {
        let _guard = self.gate.lock().await;

        if let Some(cached) = self.cache.load().await {
            debug!(target: "catalog::service", tracks = cached.catalog.tracks.len(), "Serving catalog from cache");
            let catalog = Arc::new(cached.catalog);
            *self.current.write() = Some(Arc::clone(&catalog));
            return Ok(catalog);
        }

        info!(target: "catalog::service", "Cache miss, scanning device");
        self.cache.check_and_cleanup_storage().await;
        let catalog = self.scanner.scan().await?;
        self.cache.save(&catalog).await;

        let catalog = Arc::new(catalog);
        *self.current.write() = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drop the cached catalog and scan again.
    pub async fn refresh(&self) -> Result<Arc<Catalog>, CatalogError> {
        info!(target: "catalog::service", "Refreshing catalog");
        self.clear_cache().await?;
        self.get_tracks().await
    }

    /// Remove the catalog record only.
    pub async fn clear_cache(&self) -> Result<(), CatalogError> {
        let _guard = self.gate.lock().await;
        self.cache.clear().await?;
        *self.current.write() = None;
        Ok(())
    }

    /// Remove every persisted key.
    pub async fn clear_all(&self) -> Result<(), CatalogError> {
        let _guard = self.gate.lock().await;
        self.cache.clear_all().await?;
        *self.current.write() = None;
        Ok(())
    }

    /// Last catalog handed out, if any.
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.current.read().clone()
    }

    pub fn cache(&self) -> &TrackCacheStore {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, LibraryConfig};
    use crate::library::CACHE_KEY;
    use crate::metadata::mocks::MockExtractor;
    use crate::scanner::mocks::MockMediaLibrary;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::test_utils::mock_asset;

    struct Fixture {
        service: Arc<TrackCatalogService>,
        library: Arc<MockMediaLibrary>,
        store: Arc<MemoryStore>,
    }

    fn fixture(library: MockMediaLibrary) -> Fixture {
        let library = Arc::new(library);
        let store = Arc::new(MemoryStore::new());
        let scanner = DeviceTrackScanner::new(
            library.clone(),
            Arc::new(MockExtractor::new()),
            LibraryConfig::default(),
        );
        let cache = TrackCacheStore::new(store.clone(), CacheConfig::default());
        Fixture {
            service: Arc::new(TrackCatalogService::new(cache, scanner)),
            library,
            store,
        }
    }

    fn three_assets() -> MockMediaLibrary {
        MockMediaLibrary::with_pages(vec![vec![mock_asset("a"), mock_asset("b"), mock_asset("c")]])
    }

    #[tokio::test]
    async fn test_miss_scans_and_persists() {
        let f = fixture(three_assets());

        let catalog = f.service.get_tracks().await.unwrap();
        assert_eq!(catalog.total_tracks, 3);
        assert_eq!(f.library.list_calls(), 1);
        assert!(f.store.get(CACHE_KEY).await.unwrap().is_some());
        assert_eq!(f.service.current().map(|c| c.tracks.len()), Some(3));
    }

    #[tokio::test]
    async fn test_warm_cache_skips_scan_and_is_idempotent() {
        let f = fixture(three_assets());
        f.service.get_tracks().await.unwrap();

        let first = f.service.get_tracks().await.unwrap();
        let second = f.service.get_tracks().await.unwrap();

        assert_eq!(f.library.list_calls(), 1);
        assert_eq!(first.tracks, second.tracks);
        let ids: Vec<&str> = first.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_refresh_rescans() {
        let f = fixture(three_assets());
        f.service.get_tracks().await.unwrap();

        f.service.refresh().await.unwrap();
        assert_eq!(f.library.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_scan() {
        let f = fixture(three_assets());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&f.service);
                tokio::spawn(async move { service.get_tracks().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().total_tracks, 3);
        }

        assert_eq!(f.library.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_propagates_and_caches_nothing() {
        let f = fixture(MockMediaLibrary::denied());

        let result = f.service.get_tracks().await;
        assert!(matches!(result, Err(CatalogError::PermissionDenied)));
        assert!(f.store.get(CACHE_KEY).await.unwrap().is_none());
        assert!(f.service.current().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_wipes_store() {
        let f = fixture(three_assets());
        f.store.set("user_profile", "{}").await.unwrap();
        f.service.get_tracks().await.unwrap();

        f.service.clear_all().await.unwrap();
        assert!(f.store.keys().await.unwrap().is_empty());
        assert!(f.service.current().is_none());
    }
}
