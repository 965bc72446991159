//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed arguments
//! and returns an `anyhow::Result<()>`. Every command goes through
//! [`TrackCatalogService`], wired to the filesystem adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::{self, Config};
use crate::error::ResultExt;
use crate::library::{DeviceTrackScanner, TrackCacheStore, TrackCatalogService};
use crate::metadata::LoftyExtractor;
use crate::model::{Catalog, format_duration};
use crate::scanner::FsMediaLibrary;
use crate::storage::FileStore;

/// Music Pocket CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true, env = "MUSIC_POCKET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of the persistent store (overrides `cache.dir`)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Library directory to scan (repeatable, overrides `library.paths`)
    #[arg(long = "library", global = true)]
    pub library: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Load the catalog (from cache when fresh) and print a summary
    Scan,
    /// Print every track in the catalog
    List {
        /// Print at most this many tracks
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Drop the cached catalog and rescan
    Refresh,
    /// Remove the cached catalog
    ClearCache {
        /// Remove every persisted key, not just the catalog
        #[arg(long)]
        all: bool,
    },
    /// Evict non-essential keys if the store has grown too large
    Cleanup,
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli);

    if let Commands::Config { write } = &cli.command {
        return cmd_config(cli, &config, *write);
    }

    let rt = Runtime::new()?;
    rt.block_on(async {
        let service = build_service(cli, &config).await?;
        match &cli.command {
            Commands::Scan => cmd_scan(&service).await,
            Commands::List { limit } => cmd_list(&service, *limit).await,
            Commands::Refresh => cmd_refresh(&service).await,
            Commands::ClearCache { all } => cmd_clear_cache(&service, *all).await,
            Commands::Cleanup => cmd_cleanup(&service).await,
            Commands::Config { .. } => Ok(()),
        }
    })
}

fn load_config(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

/// Store directory: flag, then config, then the per-user default.
fn store_dir(cli: &Cli, config: &Config) -> Option<PathBuf> {
    cli.store.clone().or_else(|| config.cache.dir.clone())
}

/// Library roots: flags, then config, then the user's music directory.
fn library_roots(cli: &Cli, config: &Config) -> Vec<PathBuf> {
    if !cli.library.is_empty() {
        return cli.library.clone();
    }
    if !config.library.paths.is_empty() {
        return config.library.paths.clone();
    }
    dirs::audio_dir().into_iter().collect()
}

async fn build_service(cli: &Cli, config: &Config) -> anyhow::Result<TrackCatalogService> {
    let store = match store_dir(cli, config) {
        Some(dir) => FileStore::open(dir).await,
        None => FileStore::default_location().await,
    }
    .with_context("opening the persistent store")?;
    debug!(store = %store.dir().display(), "Using persistent store");

    let mut library = config.library.clone();
    library.paths = library_roots(cli, config);
    if library.paths.is_empty() {
        anyhow::bail!("No library directory configured; pass --library <DIR>");
    }
    info!(roots = ?library.paths, "Library roots");

    let media = FsMediaLibrary::new(library.paths.clone());
    let extractor = LoftyExtractor {
        skip_artwork: library.skip_artwork,
    };
    let scanner = DeviceTrackScanner::new(Arc::new(media), Arc::new(extractor), library);
    let cache = TrackCacheStore::new(Arc::new(store), config.cache.clone());
    Ok(TrackCatalogService::new(cache, scanner))
}

// ============================================================================
// Individual command implementations
// ============================================================================

fn print_summary(catalog: &Catalog) {
    println!(
        "{} tracks (scan took {}s)",
        catalog.total_tracks, catalog.scan_duration_seconds
    );
    if catalog.tracks.len() < catalog.total_tracks {
        println!(
            "Cached record holds the first {} of them",
            catalog.tracks.len()
        );
    }
}

async fn cmd_scan(service: &TrackCatalogService) -> anyhow::Result<()> {
    let catalog = service.get_tracks().await.with_context("loading the catalog")?;
    print_summary(&catalog);
    Ok(())
}

async fn cmd_list(service: &TrackCatalogService, limit: Option<usize>) -> anyhow::Result<()> {
    let catalog = service.get_tracks().await.with_context("loading the catalog")?;
    let limit = limit.unwrap_or(usize::MAX);

    for track in catalog.tracks.iter().take(limit) {
        println!(
            "{:>7}  {} - {} [{}]",
            format_duration(track.duration),
            track.artist,
            track.title,
            track.display_album()
        );
    }
    print_summary(&catalog);
    Ok(())
}

async fn cmd_refresh(service: &TrackCatalogService) -> anyhow::Result<()> {
    let catalog = service.refresh().await.with_context("refreshing the catalog")?;
    print_summary(&catalog);
    Ok(())
}

async fn cmd_clear_cache(service: &TrackCatalogService, all: bool) -> anyhow::Result<()> {
    if all {
        service.clear_all().await.with_context("clearing the store")?;
        println!("All persisted data cleared.");
    } else {
        service.clear_cache().await.with_context("clearing the catalog cache")?;
        println!("Catalog cache cleared.");
    }
    Ok(())
}

async fn cmd_cleanup(service: &TrackCatalogService) -> anyhow::Result<()> {
    let removed = service.cache().check_and_cleanup_storage().await;
    println!("Removed {} non-essential item(s).", removed);
    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, write: bool) -> anyhow::Result<()> {
    let path = cli.config.clone().or_else(config::config_path);
    if write {
        let path = path.ok_or(config::ConfigError::NoConfigDir)?;
        config::save_to(config, &path).with_context("writing the config file")?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    match path.as_deref() {
        Some(path) => println!("# {}", describe(path)),
        None => println!("# no config directory available"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn describe(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not present, showing defaults)", path.display())
    }
}
