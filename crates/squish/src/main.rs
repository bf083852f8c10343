//! Squish CLI - batch image optimizer that keeps every asset under a byte budget.
//!
//! Squish walks a source tree, re-encodes every raster image to WebP at the
//! highest quality that fits the configured size cap, and records the run in
//! a JSON manifest next to the output.
//!
//! # Usage
//!
//! ```bash
//! # Optimize the configured source tree
//! squish optimize --backup --thumbnails
//!
//! # Audit the output tree and keep a copy of the report
//! squish validate --json --report validation-report.json
//!
//! # View configuration
//! squish config show
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod cli;
mod logging;

/// Squish - batch image optimizer with a hard per-file byte budget.
#[derive(Parser, Debug)]
#[command(name = "squish")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SQUISH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Optimize every image under the source directory
    Optimize(cli::optimize::OptimizeArgs),

    /// Check the output directory against the size cap
    Validate(cli::validate::ValidateArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Optimize(args) => {
            let config = load_config(cli.config.as_deref(), cli.verbose, cli.json_logs)?;
            cli::optimize::execute(args, config).await
        }
        Commands::Validate(args) => {
            let config = load_config(cli.config.as_deref(), cli.verbose, cli.json_logs)?;
            cli::validate::execute(args, &config).await
        }
        Commands::Config(args) => {
            // Must work even when the config file is broken
            logging::init(if cli.verbose { "debug" } else { "info" }, cli.json_logs);
            cli::config::execute(args, cli.config.as_deref()).await
        }
    }
}

/// Load the config and initialize logging from it.
///
/// A missing default file means defaults; a broken one is fatal.
fn load_config(
    path: Option<&Path>,
    verbose: bool,
    json_logs: bool,
) -> anyhow::Result<squish_core::Config> {
    let config = match path {
        Some(path) => squish_core::Config::load_from(path).map_err(|e| {
            anyhow::anyhow!("{e}\n  Check the file passed with --config: {}", path.display())
        })?,
        None => squish_core::Config::load().map_err(|e| {
            anyhow::anyhow!(
                "{e}\n  Check your config file with `squish config path`, \
                 or regenerate it with `squish config init --force`."
            )
        })?,
    };
    logging::init_from_config(&config, verbose, json_logs);
    tracing::debug!("Squish v{}", squish_core::VERSION);
    Ok(config)
}
