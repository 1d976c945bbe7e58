//! proxydown: download sniffer companion daemon.
//!
//! This is the main entry point for the proxydown binary. It parses CLI
//! arguments, initializes logging, and hands control to the application
//! startup sequence in [`proxydown::app`].

use anyhow::{Context, Result};
use clap::Parser;
use proxydown::{app, cli::Cli};
use tracing::debug;

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    app::run(&cli)
}

/// Initialize the tracing subscriber.
///
/// Debug logs go to stderr; the tray/surface layer is expected to own
/// stdout-facing interaction.
///
/// # Verbosity Levels
/// - 0 (default): Only warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
