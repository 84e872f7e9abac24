//! Checkpoint commands

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use comfy_table::Cell;
use context_export_storage::{CheckpointManager, CheckpointSummary};

use crate::context::Context;
use crate::output::{format_relative_time, format_timestamp, print_field, print_section, status_badge, TableDisplay};

#[derive(Debug, Args)]
pub struct CheckpointCommands {
    #[command(subcommand)]
    pub command: CheckpointSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum CheckpointSubcommand {
    /// List every checkpoint, newest first
    List {
        /// Only show runs for this label
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Show one checkpoint and where it would resume
    Show {
        /// Checkpoint file, file name or export id
        reference: PathBuf,
    },

    /// Delete completed checkpoints older than a number of days
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

pub fn execute(ctx: &Context, cmd: CheckpointCommands) -> Result<()> {
    let manager = CheckpointManager::new(ctx.config.checkpoint.clone());

    match cmd.command {
        CheckpointSubcommand::List { label } => list(ctx, &manager, label.as_deref()),
        CheckpointSubcommand::Show { reference } => show(ctx, &manager, &reference),
        CheckpointSubcommand::Cleanup { days } => {
            let removed = manager.cleanup_old_checkpoints(days);
            ctx.output.success(&format!(
                "Removed {} completed checkpoint(s) older than {} day(s) from {}",
                removed,
                days,
                manager.checkpoint_dir().display()
            ));
            Ok(())
        }
    }
}

fn list(ctx: &Context, manager: &CheckpointManager, label: Option<&str>) -> Result<()> {
    let checkpoints: Vec<CheckpointSummary> = manager
        .list_checkpoints()
        .into_iter()
        .filter(|summary| label.map_or(true, |label| summary.label == label))
        .collect();

    ctx.output.write_list(
        &checkpoints,
        &["Export ID", "Label", "Profile", "Wiki", "Tracker", "Errors", "Updated", "Status"],
    )
}

fn show(ctx: &Context, manager: &CheckpointManager, reference: &std::path::Path) -> Result<()> {
    let checkpoints = manager.list_checkpoints();
    let summary = checkpoints
        .iter()
        .find(|summary| {
            summary.path == reference
                || summary.path.file_name() == Some(reference.as_os_str())
                || summary.export_id.as_str() == reference.as_os_str()
        })
        .with_context(|| format!("No checkpoint matches {}", reference.display()))?;
    ctx.output.write(summary)
}

fn status(summary: &CheckpointSummary) -> &'static str {
    if summary.completed {
        "completed"
    } else {
        "in_progress"
    }
}

impl TableDisplay for CheckpointSummary {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.export_id.as_str()),
            Cell::new(&self.label),
            Cell::new(&self.profile),
            Cell::new(format!("{} ({} spaces)", self.wiki_items, self.wiki_groups)),
            Cell::new(format!("{} ({} projects)", self.tracker_items, self.tracker_groups)),
            Cell::new(self.error_count),
            Cell::new(format_relative_time(&self.last_updated)),
            Cell::new(status_badge(status(self))),
        ]
    }

    fn display_single(&self) {
        print_section(&format!("Checkpoint {}", self.export_id));
        print_field("File", &self.path.display().to_string());
        print_field("Label", &self.label);
        print_field("Profile", &self.profile);
        print_field("Started", &format_timestamp(&self.started_at));
        print_field("Updated", &format_timestamp(&self.last_updated));
        print_field(
            "Wiki",
            &format!("{} pages, {} spaces complete", self.wiki_items, self.wiki_groups),
        );
        print_field(
            "Tracker",
            &format!("{} issues, {} projects complete", self.tracker_items, self.tracker_groups),
        );
        print_field("Errors", &self.error_count.to_string());
        print_field("Status", &status_badge(status(self)));
    }

    fn display_compact(&self) {
        println!(
            "{} {} wiki={} tracker={} errors={} {}",
            self.export_id,
            self.label,
            self.wiki_items,
            self.tracker_items,
            self.error_count,
            status(self)
        );
    }
}
