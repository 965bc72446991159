//! Music Pocket - audio library catalog and playback core.
//!
//! Enumerates the audio files on a device, enriches them with tag metadata,
//! caches the resulting catalog, and drives single-track playback with queue
//! navigation, seek, and repeat.
//!
//! - [`library::TrackCatalogService`]: the catalog entry point
//! - [`player::PlaybackEngine`]: transport controls and published state
//! - [`storage`], [`scanner`], [`metadata`]: ports with filesystem adapters

pub mod cli;
pub mod config;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod player;
pub mod scanner;
pub mod storage;
#[cfg(test)]
pub mod test_utils;
