//! Export and connectivity commands

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use tracing::{info, warn};

use context_export_sdk::{ClientStats, ResilientClient, TrackerClient, WikiClient};
use context_export_storage::CheckpointManager;
use context_export_workflow::{ExportOrchestrator, ExportReport, MarkdownSink, TrackerSource, WikiSource};

use crate::context::{ConnectionArgs, Context};
use crate::output::{print_field, print_list_field, print_section, status_badge, TableDisplay};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Label whose pages and issues are exported
    #[arg(short, long)]
    pub label: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Resume from a checkpoint file, file name or export id
    #[arg(long, conflicts_with = "resume_latest")]
    pub resume: Option<PathBuf>,

    /// Resume the most recent unfinished run for this label, or start a new one
    #[arg(long)]
    pub resume_latest: bool,

    /// Skip wiki pages
    #[arg(long)]
    pub no_wiki: bool,

    /// Skip tracker issues
    #[arg(long)]
    pub no_tracker: bool,

    /// Fetch and render without writing documents or checkpoints
    #[arg(long)]
    pub dry_run: bool,

    /// Root directory for exported documents
    #[arg(long, default_value = "exports")]
    pub output_dir: PathBuf,
}

pub async fn execute(ctx: &Context, args: ExportArgs) -> Result<()> {
    if args.no_wiki && args.no_tracker {
        bail!("Nothing to export: both --no-wiki and --no-tracker were given");
    }
    let wiki_url = required_url(!args.no_wiki, &args.connection.wiki_url, "wiki", "--wiki-url", "WIKI_URL")?;
    let tracker_url = required_url(
        !args.no_tracker,
        &args.connection.tracker_url,
        "tracker",
        "--tracker-url",
        "TRACKER_URL",
    )?;

    info!(profile = ?ctx.config.profile_info(), "Export settings");

    let mut checkpoint_config = ctx.config.checkpoint.clone();
    if args.dry_run {
        checkpoint_config.enabled = false;
    }
    let mut checkpoint = CheckpointManager::new(checkpoint_config);
    let export_date = open_run(ctx, &mut checkpoint, &args)?;

    let auth = args.connection.auth();
    let batch = &ctx.config.batch;
    let mut clients: Vec<Arc<ResilientClient>> = Vec::new();
    let sink = MarkdownSink::new(&args.output_dir, export_date);
    let mut orchestrator = ExportOrchestrator::new(checkpoint, Box::new(sink), &args.label)
        .dry_run(args.dry_run);

    if let Some(url) = wiki_url {
        let client = ctx.create_client("wiki", url, auth.clone())?;
        clients.push(client.clone());
        orchestrator = orchestrator.with_source(Box::new(
            WikiSource::new(WikiClient::new(client), batch.wiki_batch_size)
                .with_child_depth(batch.wiki_child_depth),
        ));
    }
    if let Some(url) = tracker_url {
        let client = ctx.create_client("tracker", url, auth)?;
        clients.push(client.clone());
        orchestrator = orchestrator.with_source(Box::new(TrackerSource::new(
            TrackerClient::new(client),
            batch.tracker_batch_size,
        )));
    }

    let report = orchestrator.run().await.context("Export failed")?;
    for client in &clients {
        info!(stats = ?client.stats(), "Client statistics");
    }

    ctx.output.write(&report)?;
    if report.items_failed > 0 || report.sources_failed > 0 {
        ctx.output.warning(&format!(
            "{} item(s) and {} source(s) failed; details are in the checkpoint's error log",
            report.items_failed, report.sources_failed
        ));
    } else if args.dry_run {
        ctx.output.info("Dry run: no documents or checkpoints were written");
    } else {
        ctx.output.success(&format!("Export {} complete", report.export_id));
    }
    Ok(())
}

fn required_url<'a>(
    wanted: bool,
    url: &'a Option<String>,
    service: &str,
    flag: &str,
    env: &str,
) -> Result<Option<&'a str>> {
    match (wanted, url.as_deref()) {
        (false, _) => Ok(None),
        (true, Some(url)) => Ok(Some(url)),
        (true, None) => bail!("The {service} URL is required: pass {flag} or set {env}"),
    }
}

/// Start a new run or resume an earlier one. Returns the run's export date.
fn open_run(ctx: &Context, checkpoint: &mut CheckpointManager, args: &ExportArgs) -> Result<NaiveDate> {
    if let Some(reference) = &args.resume {
        let state = checkpoint.resume_export(reference).with_context(|| {
            format!("Cannot resume from {}; see the log for details", reference.display())
        })?;
        ensure_label(&state.label, &args.label)?;
        ctx.output.info(&format!(
            "Resuming export {} ({} items already exported)",
            state.export_id,
            state.total_items_exported()
        ));
        return Ok(state.export_date);
    }

    if args.resume_latest {
        if let Some(path) = checkpoint.find_latest_unfinished(&args.label) {
            if let Some(state) = checkpoint.resume_export(&path) {
                ctx.output.info(&format!(
                    "Resuming export {} ({} items already exported)",
                    state.export_id,
                    state.total_items_exported()
                ));
                return Ok(state.export_date);
            }
            warn!(path = %path.display(), "Latest checkpoint is not resumable; starting a new export");
        } else {
            info!(label = %args.label, "No unfinished checkpoint found; starting a new export");
        }
    }

    let export_date = Local::now().date_naive();
    let state = checkpoint.start_new_export(&args.label, export_date, &ctx.profile().to_string());
    ctx.output.info(&format!("Starting export {}", state.export_id));
    Ok(export_date)
}

fn ensure_label(stored: &str, requested: &str) -> Result<()> {
    if stored != requested {
        bail!("Checkpoint belongs to label '{stored}', not '{requested}'");
    }
    Ok(())
}

impl TableDisplay for ExportReport {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.export_id.as_str()),
            Cell::new(self.items_exported),
            Cell::new(self.items_skipped),
            Cell::new(self.items_failed),
        ]
    }

    fn display_single(&self) {
        print_section(&format!("Export {}", self.export_id));
        print_field("Label", &self.summary.label);
        print_field(
            "Groups",
            &format!("{} exported, {} skipped", self.groups_exported, self.groups_skipped),
        );
        print_field(
            "Items",
            &format!(
                "{} exported, {} skipped, {} failed",
                self.items_exported, self.items_skipped, self.items_failed
            ),
        );
        print_field(
            "Totals",
            &format!(
                "{} wiki, {} tracker",
                self.summary.wiki_items, self.summary.tracker_items
            ),
        );
        print_field("Errors", &self.summary.error_count.to_string());
        let documents: Vec<String> = self
            .documents
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        print_list_field("Documents", &documents);
    }

    fn display_compact(&self) {
        println!(
            "{} exported={} skipped={} failed={}",
            self.export_id, self.items_exported, self.items_skipped, self.items_failed
        );
    }
}

/// Result of probing one service
#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub service: String,
    pub url: String,
    pub ok: bool,
    pub detail: String,
    pub stats: ClientStats,
}

impl TableDisplay for ProbeResult {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.service),
            Cell::new(&self.url),
            Cell::new(status_badge(if self.ok { "ok" } else { "failed" })),
            Cell::new(status_badge(&self.stats.circuit.state.to_string())),
            Cell::new(&self.detail),
        ]
    }

    fn display_single(&self) {
        print_section(&self.service);
        print_field("URL", &self.url);
        print_field("Result", &self.detail);
    }

    fn display_compact(&self) {
        println!("{} {} {}", self.service, if self.ok { "ok" } else { "failed" }, self.detail);
    }
}

/// Probe each configured service once, bypassing the cache
pub async fn check(ctx: &Context, args: &ConnectionArgs) -> Result<()> {
    let auth = args.auth();
    let mut results = Vec::new();

    if let Some(url) = &args.wiki_url {
        let client = ctx.create_client("wiki", url, auth.clone())?;
        let outcome = WikiClient::new(client.clone()).current_user().await;
        results.push(probe_result("wiki", url, &client, outcome.map(signed_in_as)));
    }
    if let Some(url) = &args.tracker_url {
        let client = ctx.create_client("tracker", url, auth)?;
        let outcome = TrackerClient::new(client.clone()).myself().await;
        results.push(probe_result("tracker", url, &client, outcome.map(signed_in_as)));
    }

    if results.is_empty() {
        bail!("No service configured: pass --wiki-url and/or --tracker-url");
    }

    ctx.output
        .write_list(&results, &["Service", "URL", "Result", "Circuit", "Detail"])?;
    if results.iter().any(|r| !r.ok) {
        bail!("At least one service could not be reached");
    }
    Ok(())
}

fn signed_in_as(user: serde_json::Value) -> String {
    user.get("displayName")
        .and_then(|name| name.as_str())
        .map(|name| format!("Signed in as {name}"))
        .unwrap_or_else(|| "Reachable".to_string())
}

fn probe_result(
    service: &str,
    url: &str,
    client: &ResilientClient,
    outcome: context_export_sdk::SdkResult<String>,
) -> ProbeResult {
    let (ok, detail) = match outcome {
        Ok(detail) => (true, detail),
        Err(err) => (false, err.to_string()),
    };
    ProbeResult {
        service: service.to_string(),
        url: url.to_string(),
        ok,
        detail,
        stats: client.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_url() {
        let set = Some("https://wiki.example".to_string());
        assert_eq!(required_url(true, &set, "wiki", "--wiki-url", "WIKI_URL").unwrap(), Some("https://wiki.example"));
        assert_eq!(required_url(false, &None, "wiki", "--wiki-url", "WIKI_URL").unwrap(), None);

        let err = required_url(true, &None, "wiki", "--wiki-url", "WIKI_URL").unwrap_err();
        assert!(err.to_string().contains("WIKI_URL"));
    }

    #[test]
    fn test_ensure_label() {
        assert!(ensure_label("q3", "q3").is_ok());
        assert!(ensure_label("q3", "q4").is_err());
    }
}
