//! Command-line interface for music-pocket.
//!
//! This module provides CLI commands for scanning the library, listing the
//! cached catalog, and maintaining the persistent store.

mod commands;

pub use commands::{Cli, Commands, run_command};
