//! Music Pocket - audio library catalog and playback core.
//!
//! The binary drives the track catalog from the command line.

use clap::Parser;
use music_pocket::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    // Library events log under per-area targets (catalog::*, player::*, storage::*)
    let mut filter = EnvFilter::from_default_env();
    for directive in ["music_pocket=info", "catalog=info", "player=info", "storage=info"] {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
