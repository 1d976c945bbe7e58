//! Command-line interface definitions for proxydown.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Download sniffer companion: local intercepting proxy plus system
/// proxy-routing management.
///
/// proxydown starts the sniff proxy, resolves its listening ports without
/// colliding with other processes, and keeps the persisted routing mode in
/// sync with the operating system's proxy configuration.
#[derive(Parser, Debug)]
#[command(name = "proxydown")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    ///
    /// Defaults to `proxydown/config.toml` in the per-user configuration
    /// directory. The file is created with defaults on first run.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run without any UI surface.
    ///
    /// The proxy and routing machinery still start; sniffed tasks are
    /// logged instead of revealing a surface.
    #[arg(long = "headless")]
    pub headless: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
