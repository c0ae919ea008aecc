//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Stitch - runtime script and stylesheet bundler
///
/// Resolves, transforms and concatenates scripts or stylesheets from local
/// search paths and whitelisted remote URLs.
#[derive(Parser, Debug)]
#[command(name = "stitch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .stitch.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a bundle and write it to stdout or a file
    Bundle(BundleArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// List whitelisted remote tokens
    Whitelist,
}

/// Arguments for the bundle command
#[derive(Parser, Debug)]
pub struct BundleArgs {
    /// Bundle stylesheets instead of scripts
    #[arg(long)]
    pub style: bool,

    /// Minify the combined output
    #[arg(short, long)]
    pub minify: bool,

    /// Application root that `~/` maps to (overrides general.root)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Write the bundle to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path tokens, in output order
    #[arg(required = true)]
    pub tokens: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
