//! Command-line interface parsing for Pitwall
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the cache configuration used at startup.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{default_cache_file, CacheConfig};
use crate::data::ERGAST_BASE_URL;

/// Error types for CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// `clear` was run without confirmation
    #[error("Refusing to delete {0} without --yes")]
    ClearNotConfirmed(PathBuf),
}

/// Pitwall - F1 dashboard with background polling
#[derive(Parser, Debug)]
#[command(name = "pitwall")]
#[command(about = "F1 dashboard with background polling and a disk cache")]
#[command(version)]
pub struct Cli {
    /// Hours between data polls
    #[arg(
        long = "poll-hours",
        env = "PITWALL_POLL_HOURS",
        default_value_t = 12,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub poll_hours: u32,

    /// Cache file location (defaults to the user cache directory)
    #[arg(long, env = "PITWALL_CACHE_FILE", value_name = "PATH", global = true)]
    pub cache_file: Option<PathBuf>,

    /// Force an immediate data update on startup
    #[arg(long, global = true)]
    pub force_update: bool,

    /// Base URL of the Ergast-compatible F1 API
    #[arg(long, env = "PITWALL_API_URL", default_value = ERGAST_BASE_URL, global = true)]
    pub api_url: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do once the cache is running
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the dashboard once and exit (default)
    Show,
    /// Keep polling in the background and reprint the dashboard periodically
    Watch {
        /// Seconds between dashboard reprints
        #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
        refresh_secs: u64,
    },
    /// Print cache status as JSON without fetching
    Status,
    /// Serve the data as a JSON API until interrupted
    Serve {
        /// Address to bind
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        bind: IpAddr,
        /// Port to listen on
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
    /// Delete the cache file
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    /// The subcommand to run, defaulting to `show`
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Show)
    }

    /// Path of the cache file, resolved against the platform default
    pub fn cache_file(&self) -> PathBuf {
        self.cache_file.clone().unwrap_or_else(default_cache_file)
    }

    /// Builds the cache configuration from the parsed arguments
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            poll_interval_hours: self.poll_hours,
            ..CacheConfig::with_cache_file(self.cache_file())
        }
    }
}
