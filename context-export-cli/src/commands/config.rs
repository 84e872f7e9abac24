//! Configuration commands

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use comfy_table::Cell;
use context_export_core::{ExporterConfig, Profile};
use serde::Serialize;

use crate::context::Context;
use crate::output::{print_field, print_section, TableDisplay};

/// Configuration commands
#[derive(Debug, Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show the resolved configuration for the selected profile
    Show,

    /// Write the resolved configuration to a JSON file
    Save {
        /// Destination file
        path: PathBuf,
    },

    /// List the available profiles
    Profiles,
}

pub fn execute(ctx: &Context, cmd: ConfigCommands) -> Result<()> {
    match cmd.command {
        ConfigSubcommand::Show => ctx.output.write(&ctx.config),
        ConfigSubcommand::Save { path } => {
            ctx.config
                .save_to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ctx.output.success(&format!(
                "Saved {} configuration to {}",
                ctx.config.profile,
                path.display()
            ));
            Ok(())
        }
        ConfigSubcommand::Profiles => {
            let rows: Vec<ProfileRow> = Profile::ALL
                .iter()
                .map(|profile| ProfileRow::new(*profile, ctx.config.profile))
                .collect();
            ctx.output
                .write_list(&rows, &["Profile", "Requests/s", "Retries", "Batch (wiki/tracker)", "Description"])
        }
    }
}

fn secs(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs_f64())
}

impl TableDisplay for ExporterConfig {
    fn to_row(&self) -> Vec<Cell> {
        vec![Cell::new(self.profile), Cell::new(self.profile.description())]
    }

    fn display_single(&self) {
        println!("{} {}", "Profile:".bold(), self.profile.to_string().green());
        println!("  {}", self.profile.description().dimmed());

        print_section("Retry");
        print_field("max_retries", &self.retry.max_retries.to_string());
        print_field("initial_delay", &secs(self.retry.initial_delay));
        print_field("max_delay", &secs(self.retry.max_delay));
        print_field("exponential_base", &self.retry.exponential_base.to_string());
        print_field("jitter", &self.retry.jitter.to_string());
        print_field("retryable_status_codes", &format!("{:?}", self.retry.retryable_status_codes));

        print_section("Rate limit");
        print_field("requests_per_second", &self.rate_limit.requests_per_second.to_string());
        print_field("burst_size", &self.rate_limit.burst_size.to_string());
        print_field("min_request_interval", &secs(self.rate_limit.min_request_interval));

        print_section("Circuit breaker");
        print_field("failure_threshold", &self.circuit_breaker.failure_threshold.to_string());
        print_field("recovery_timeout", &secs(self.circuit_breaker.recovery_timeout));

        print_section("Cache");
        print_field("enabled", &self.cache.enabled.to_string());
        print_field("ttl", &secs(self.cache.ttl));
        print_field("max_size", &self.cache.max_size.to_string());
        print_field("cache_dir", &self.cache.cache_dir.display().to_string());

        print_section("Timeouts");
        print_field("connect_timeout", &secs(self.timeout.connect_timeout));
        print_field("read_timeout", &secs(self.timeout.read_timeout));

        print_section("Batches");
        print_field("wiki_batch_size", &self.batch.wiki_batch_size.to_string());
        print_field("tracker_batch_size", &self.batch.tracker_batch_size.to_string());
        print_field("max_concurrent_requests", &self.batch.max_concurrent_requests.to_string());
        print_field("wiki_child_depth", &self.batch.wiki_child_depth.to_string());

        print_section("Checkpoints");
        print_field("enabled", &self.checkpoint.enabled.to_string());
        print_field("checkpoint_dir", &self.checkpoint.checkpoint_dir.display().to_string());
        print_field("checkpoint_interval", &self.checkpoint.checkpoint_interval.to_string());

        print_section("Logging");
        print_field("level", &self.logging.level);
        print_field("format", &format!("{:?}", self.logging.format).to_lowercase());
        print_field(
            "log_file",
            &self
                .logging
                .log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        print_field("console_output", &self.logging.console_output.to_string());
    }

    fn display_compact(&self) {
        let info = self.profile_info();
        println!(
            "{} rps={} retries={} wiki_batch={} tracker_batch={} cache={} checkpoints={}",
            info.profile,
            info.requests_per_second,
            info.max_retries,
            info.wiki_batch_size,
            info.tracker_batch_size,
            info.cache_enabled,
            info.checkpoint_enabled
        );
    }
}

#[derive(Debug, Serialize)]
struct ProfileRow {
    profile: Profile,
    active: bool,
    requests_per_second: f64,
    max_retries: u32,
    wiki_batch_size: u32,
    tracker_batch_size: u32,
    description: &'static str,
}

impl ProfileRow {
    fn new(profile: Profile, active: Profile) -> Self {
        let config = ExporterConfig::for_profile(profile);
        Self {
            profile,
            active: profile == active,
            requests_per_second: config.rate_limit.requests_per_second,
            max_retries: config.retry.max_retries,
            wiki_batch_size: config.batch.wiki_batch_size,
            tracker_batch_size: config.batch.tracker_batch_size,
            description: profile.description(),
        }
    }
}

impl TableDisplay for ProfileRow {
    fn to_row(&self) -> Vec<Cell> {
        let name = if self.active {
            format!("{} (active)", self.profile).green().to_string()
        } else {
            self.profile.to_string()
        };
        vec![
            Cell::new(name),
            Cell::new(self.requests_per_second),
            Cell::new(self.max_retries),
            Cell::new(format!("{}/{}", self.wiki_batch_size, self.tracker_batch_size)),
            Cell::new(self.description),
        ]
    }

    fn display_single(&self) {
        print_section(&self.profile.to_string());
        print_field("description", self.description);
    }

    fn display_compact(&self) {
        println!("{} {}", self.profile, self.description);
    }
}
