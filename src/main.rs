//! Stitch - runtime script and stylesheet bundler
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use stitch::cli::{Cli, Commands};
use stitch::config::{Config, ConfigManager};
use stitch::error::{BundleError, BundleResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BundleResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| BundleError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let mut config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Found local config: {}", path.display());
        anchor_root(&mut config, path);
    }

    match cli.command {
        Commands::Bundle(args) => stitch::cli::commands::bundle(args, &config).await,
        Commands::Config(args) => {
            stitch::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Whitelist => stitch::cli::commands::whitelist(&config).await,
    }
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("stitch=warn"),
        1 => EnvFilter::new("stitch=info"),
        _ => EnvFilter::new("stitch=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// A relative root in a project-local config is relative to that file
fn anchor_root(config: &mut Config, local_config: &std::path::Path) {
    if config.general.root.is_absolute() {
        return;
    }
    if let Some(dir) = local_config.parent() {
        let anchored: PathBuf = dir.join(&config.general.root);
        debug!("Application root: {}", anchored.display());
        config.general.root = anchored;
    }
}
