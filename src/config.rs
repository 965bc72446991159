//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-pocket\config.toml
//! - macOS: ~/Library/Application Support/music-pocket/config.toml
//! - Linux: ~/.config/music-pocket/config.toml
//!
//! Every section uses `#[serde(default)]`, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// URI fragments the platform lists but cannot decode.
pub const DEFAULT_INVALID_URI_PATTERNS: &[&str] =
    &["NrvqLxhkCcloQ0GaAZZqjRjhYdAz21aLGRhbkbOsvxk2K0yM3x1no6UusW+ptb2q"];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library scanning settings
    pub library: LibraryConfig,

    /// Catalog cache settings
    pub cache: CacheConfig,

    /// Playback settings
    pub playback: PlaybackConfig,
}

/// Library scanning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directories the filesystem media library walks
    pub paths: Vec<PathBuf>,

    /// Assets requested per page from the media library
    pub page_size: usize,

    /// Files whose metadata is extracted concurrently
    pub extraction_concurrency: usize,

    /// Assets whose URI contains one of these get filename-only info
    pub invalid_uri_patterns: Vec<String>,

    /// Skip embedded artwork during extraction
    pub skip_artwork: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            page_size: 100,
            extraction_concurrency: 8,
            invalid_uri_patterns: DEFAULT_INVALID_URI_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            skip_artwork: false,
        }
    }
}

/// Catalog cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a cached catalog is ignored
    pub expiry_days: u32,

    /// Tracks persisted in a normal cache record
    pub max_cached_tracks: usize,

    /// Tracks persisted in the reduced record written when storage is full
    pub reduced_cached_tracks: usize,

    /// Key count above which preventive cleanup evicts non-essential keys
    pub cleanup_key_threshold: usize,

    /// Store directory (unset = per-user data directory)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiry_days: 7,
            max_cached_tracks: 100,
            reduced_cached_tracks: 50,
            cleanup_key_threshold: 20,
            dir: None,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How often position/duration are polled while playing
    pub progress_interval_ms: u64,

    /// "Previous" restarts the current track once this much has elapsed
    pub restart_threshold_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
            restart_threshold_ms: 3000,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-pocket"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, falling back to defaults.
pub fn load_from(path: &std::path::Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to a specific file.
pub fn save_to(config: &Config, path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
