//! Device scan: paged asset listing plus per-file metadata enrichment.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::CatalogError;
use crate::config::LibraryConfig;
use crate::metadata::MetadataExtractor;
use crate::model::{Catalog, Track, UNKNOWN_ARTIST, title_from_filename};
use crate::scanner::{AudioAsset, MediaLibrary, PageRequest};

/// Builds a [`Catalog`] from the device's audio assets.
pub struct DeviceTrackScanner {
    library: Arc<dyn MediaLibrary>,
    extractor: Arc<dyn MetadataExtractor>,
    config: LibraryConfig,
}

impl DeviceTrackScanner {
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        extractor: Arc<dyn MetadataExtractor>,
        config: LibraryConfig,
    ) -> Self {
        Self {
            library,
            extractor,
            config,
        }
    }

    /// Scan the device.
    ///
    /// Fails only when permission is refused or the listing itself breaks;
    /// a file whose metadata cannot be read is kept with basic info.
    pub async fn scan(&self) -> Result<Catalog, CatalogError> {
        let started = Instant::now();

        let permission = self
            .library
            .request_permission()
            .await
            .map_err(|e| CatalogError::Listing(e.to_string()))?;
        if !permission.granted {
            warn!(target: "catalog::scan", can_ask_again = permission.can_ask_again, "Media library permission not granted");
            return Err(CatalogError::PermissionDenied);
        }

        let assets = dedup_by_id(self.list_all().await?);
        info!(
            target: "catalog::scan",
            assets = assets.len(),
            elapsed = %format!("{:.4}s",started.elapsed().as_secs_f64()),
            "Found audio files"
        );

        let concurrency = self.config.extraction_concurrency.max(1);
        let tracks: Vec<Track> = futures::stream::iter(assets)
            .map(|asset| self.enrich(asset))
            .buffered(concurrency)
            .collect()
            .await;

        let scan_duration_seconds = format!("{:.4}", started.elapsed().as_secs_f64());
        info!(target: "catalog::scan", tracks = tracks.len(), seconds = %scan_duration_seconds, "Scan complete");

        Ok(Catalog {
            total_tracks: tracks.len(),
            tracks,
            scan_duration_seconds,
        })
    }

    /// Fetch every page until the library reports no more.
    async fn list_all(&self) -> Result<Vec<AudioAsset>, CatalogError> {
        let page_size = self.config.page_size.max(1);
        let mut assets = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .library
                .list_audio_assets(PageRequest {
                    first: page_size,
                    after: cursor.take(),
                })
                .await
                .map_err(|e| CatalogError::Listing(e.to_string()))?;

            debug!(target: "catalog::scan", page_assets = page.assets.len(), total = ?page.total_count, "Fetched asset page");
            let empty = page.assets.is_empty();
            assets.extend(page.assets);

            if !page.has_next_page || empty || page.end_cursor.is_none() {
                break;
            }
            cursor = page.end_cursor;
        }
        Ok(assets)
    }

    /// Turn an asset into a track, extracting tags when the URI is usable.
    async fn enrich(&self, asset: AudioAsset) -> Track {
        if !is_valid_audio_uri(&asset.uri, &self.config.invalid_uri_patterns) {
            debug!(target: "catalog::scan", id = %asset.id, "Skipping extraction for invalid URI");
            return basic_track_info(&asset);
        }

        match self.extractor.extract(&asset.uri).await {
            Ok(metadata) => {
                let basic = basic_track_info(&asset);
                Track {
                    title: metadata.title.unwrap_or(basic.title),
                    artist: metadata.artist.unwrap_or(basic.artist),
                    album_title: metadata.album_title,
                    artwork: metadata.artwork,
                    duration: basic.duration.or(metadata.duration_ms),
                    ..basic
                }
            }
            Err(e) => {
                warn!(target: "catalog::scan", file = %asset.filename, error = %e, "Metadata error");
                basic_track_info(&asset)
            }
        }
    }
}

/// Whether the URI is worth handing to the extractor.
pub fn is_valid_audio_uri(uri: &str, invalid_patterns: &[String]) -> bool {
    !uri.is_empty() && !invalid_patterns.iter().any(|p| uri.contains(p.as_str()))
}

/// Track built from asset fields alone (no tag reading).
pub fn basic_track_info(asset: &AudioAsset) -> Track {
    let filename = if asset.filename.is_empty() {
        "Unknown".to_string()
    } else {
        asset.filename.clone()
    };
    Track {
        id: asset.id.clone(),
        title: title_from_filename(&asset.filename),
        filename,
        uri: asset.uri.clone(),
        duration: asset.duration_ms,
        artist: UNKNOWN_ARTIST.to_string(),
        album_title: None,
        artwork: None,
        last_modified: asset
            .modification_time
            .unwrap_or_else(super::cache::now_ms),
    }
}

/// Keep the first asset for each id, preserving order.
fn dedup_by_id(assets: Vec<AudioAsset>) -> Vec<AudioAsset> {
    let mut seen = HashSet::with_capacity(assets.len());
    assets
        .into_iter()
        .filter(|asset| seen.insert(asset.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mocks::MockExtractor;
    use crate::scanner::ListError;
    use crate::scanner::mocks::MockMediaLibrary;
    use crate::test_utils::mock_asset;

    fn scanner(library: MockMediaLibrary, extractor: Arc<MockExtractor>) -> DeviceTrackScanner {
        DeviceTrackScanner::new(Arc::new(library), extractor, LibraryConfig::default())
    }

    #[tokio::test]
    async fn test_permission_denied_aborts_scan() {
        let extractor = Arc::new(MockExtractor::new());
        let result = scanner(MockMediaLibrary::denied(), extractor.clone()).scan().await;

        assert!(matches!(result, Err(CatalogError::PermissionDenied)));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_walks_every_page() {
        let pages = vec![
            (0..3).map(|i| mock_asset(&format!("a{}", i))).collect(),
            (0..3).map(|i| mock_asset(&format!("b{}", i))).collect(),
            vec![mock_asset("c0")],
        ];
        let library = Arc::new(MockMediaLibrary::with_pages(pages));
        let scanner = DeviceTrackScanner::new(
            library.clone(),
            Arc::new(MockExtractor::new()),
            LibraryConfig::default(),
        );

        let catalog = scanner.scan().await.unwrap();
        assert_eq!(library.list_calls(), 3);
        assert_eq!(catalog.total_tracks, 7);
        let ids: Vec<&str> = catalog.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a1", "a2", "b0", "b1", "b2", "c0"]);
    }

    #[tokio::test]
    async fn test_overlapping_pages_are_deduplicated() {
        let pages = vec![
            vec![mock_asset("w"), mock_asset("x")],
            vec![mock_asset("x"), mock_asset("y")],
        ];
        let extractor = Arc::new(MockExtractor::new());
        let catalog = scanner(MockMediaLibrary::with_pages(pages), extractor.clone())
            .scan()
            .await
            .unwrap();

        let xs = catalog.tracks.iter().filter(|t| t.id == "x").count();
        assert_eq!(xs, 1);
        assert_eq!(catalog.tracks.len(), 3);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_one_bad_file_is_downgraded_not_dropped() {
        let assets: Vec<AudioAsset> = (0..5).map(|i| mock_asset(&format!("t{}", i))).collect();
        let bad_uri = assets[2].uri.clone();
        let extractor = Arc::new(MockExtractor::new().failing_on(&bad_uri));

        let catalog = scanner(MockMediaLibrary::with_pages(vec![assets]), extractor)
            .scan()
            .await
            .unwrap();

        assert_eq!(catalog.tracks.len(), 5);
        let bad = &catalog.tracks[2];
        assert_eq!(bad.title, "t2");
        assert_eq!(bad.artist, UNKNOWN_ARTIST);
        assert!(bad.album_title.is_none());
        assert_eq!(catalog.tracks[0].artist, "Tagged Artist");
    }

    #[tokio::test]
    async fn test_invalid_uris_skip_extraction() {
        let mut broken = mock_asset("broken");
        broken.uri = format!("content://media/{}", crate::config::DEFAULT_INVALID_URI_PATTERNS[0]);
        let mut empty = mock_asset("empty");
        empty.uri = String::new();

        let extractor = Arc::new(MockExtractor::new());
        let catalog = scanner(
            MockMediaLibrary::with_pages(vec![vec![broken, empty, mock_asset("ok")]]),
            extractor.clone(),
        )
        .scan()
        .await
        .unwrap();

        assert_eq!(catalog.tracks.len(), 3);
        assert_eq!(extractor.calls(), 1);
        assert_eq!(catalog.tracks[0].artist, UNKNOWN_ARTIST);
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let mut library = MockMediaLibrary::with_pages(vec![]);
        library.error = Some(ListError::Store("media store crashed".to_string()));

        let result = scanner(library, Arc::new(MockExtractor::new())).scan().await;
        assert!(matches!(result, Err(CatalogError::Listing(_))));
    }

    #[test]
    fn test_basic_track_info_fallbacks() {
        let mut asset = mock_asset("z");
        asset.filename = String::new();
        asset.modification_time = None;

        let track = basic_track_info(&asset);
        assert_eq!(track.filename, "Unknown");
        assert_eq!(track.title, "Unknown");
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert!(track.last_modified > 0);
    }

    #[test]
    fn test_valid_uri_check() {
        let patterns = vec!["BADPATTERN".to_string()];
        assert!(is_valid_audio_uri("file:///a.mp3", &patterns));
        assert!(!is_valid_audio_uri("", &patterns));
        assert!(!is_valid_audio_uri("content://x/BADPATTERN/1", &patterns));
    }
}
