//! `context-export`: resumable exports of labeled wiki pages and tracker
//! issues.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use context_export_core::{ExporterConfig, Profile};

mod commands;
mod context;
mod logging;
mod output;

use commands::{checkpoints::CheckpointCommands, config::ConfigCommands, export::ExportArgs};
use context::{ConnectionArgs, Context};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "context-export", version, about, propagate_version = true)]
pub struct Cli {
    /// Tuning profile: fast, balanced or conservative
    #[arg(long, global = true, env = "EXPORTER_PROFILE", default_value_t = Profile::Balanced)]
    pub profile: Profile,

    /// JSON or TOML file overriding the profile settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Export labeled content, optionally resuming an earlier run
    Export(ExportArgs),

    /// Probe both services with the configured credentials
    Check(ConnectionArgs),

    /// Inspect and clean up checkpoints
    Checkpoints(CheckpointCommands),

    /// Show or save the resolved configuration
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", "✗".red(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ExporterConfig::load(cli.profile, cli.config.as_deref())
        .context("Failed to load configuration")?;
    logging::init_logging(&config.logging, cli.verbose)?;
    tracing::debug!(profile = %config.profile, "Configuration loaded");

    let ctx = Context::new(&cli, config);
    match cli.command {
        Commands::Export(args) => commands::export::execute(&ctx, args).await,
        Commands::Check(args) => commands::export::check(&ctx, &args).await,
        Commands::Checkpoints(cmd) => commands::checkpoints::execute(&ctx, cmd),
        Commands::Config(cmd) => commands::config::execute(&ctx, cmd),
    }
}
