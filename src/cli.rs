//! Command-line interface for promtune
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Play Prometheus metrics as sound
#[derive(Parser, Debug)]
#[command(name = "promtune", version = crate::VERSION, about = "Play Prometheus metrics as sound")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: per-chunk progress, -vv: window and device details)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Prometheus server URL (e.g., http://localhost:9090)
    #[arg(long, visible_alias = "prom_url", value_name = "URL")]
    pub prom_url: Option<String>,

    /// PromQL query to play
    #[arg(long, value_name = "QUERY")]
    pub track: Option<String>,

    /// Play from now minus this offset when no start time is set (e.g., 24h, 90m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub offset: Option<Duration>,

    /// Start of the range, "YYYY-MM-DD HH:MM:SS" (UTC)
    #[arg(long, visible_alias = "start_time", value_name = "TIME")]
    pub start_time: Option<String>,

    /// End of the range, "YYYY-MM-DD HH:MM:SS" (UTC); defaults to now
    #[arg(long, visible_alias = "end_time", value_name = "TIME")]
    pub end_time: Option<String>,

    /// Time range covered by each query (e.g., 1m, 30s)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub chunk: Option<Duration>,

    /// Audio output device (see `promtune devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio output devices
    Devices,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration as TOML
    Show,
}
