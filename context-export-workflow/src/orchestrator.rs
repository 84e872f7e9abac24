//! Drives one export run: discover each source's groups, render what has not
//! been exported yet, hand the sections to the sink and report progress to
//! the checkpoint manager.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Map};
use tracing::{debug, info, warn};

use context_export_core::{ContentDomain, ContentGroup, ExportId};
use context_export_storage::{CheckpointError, CheckpointManager, CompletionSummary};

use crate::error::WorkflowResult;
use crate::sink::DocumentSink;
use crate::sources::ContentSource;

/// Outcome of [`ExportOrchestrator::run`]
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub export_id: ExportId,
    pub groups_exported: usize,
    pub groups_skipped: usize,
    pub items_exported: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub sources_failed: usize,
    pub documents: Vec<PathBuf>,
    pub summary: CompletionSummary,
}

#[derive(Debug, Default)]
struct Tally {
    groups_exported: usize,
    groups_skipped: usize,
    items_exported: usize,
    items_skipped: usize,
    items_failed: usize,
    sources_failed: usize,
    documents: Vec<PathBuf>,
}

pub struct ExportOrchestrator {
    checkpoint: CheckpointManager,
    sources: Vec<Box<dyn ContentSource>>,
    sink: Box<dyn DocumentSink>,
    label: String,
    dry_run: bool,
}

impl ExportOrchestrator {
    /// The checkpoint manager must already hold a started or resumed run.
    pub fn new(
        checkpoint: CheckpointManager,
        sink: Box<dyn DocumentSink>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            checkpoint,
            sources: Vec::new(),
            sink,
            label: label.into(),
            dry_run: false,
        }
    }

    /// Sources run in the order they are added
    pub fn with_source(mut self, source: Box<dyn ContentSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Render everything but never call the sink
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    pub fn into_checkpoint(self) -> CheckpointManager {
        self.checkpoint
    }

    pub async fn run(&mut self) -> WorkflowResult<ExportReport> {
        let Self {
            checkpoint,
            sources,
            sink,
            label,
            dry_run,
        } = self;
        let label = label.as_str();
        let dry_run = *dry_run;

        let export_id = checkpoint
            .state()
            .map(|state| state.export_id.clone())
            .ok_or(CheckpointError::NoActiveExport)?;
        info!(%export_id, %label, dry_run, "Starting export");

        let mut tally = Tally::default();
        for source in sources.iter() {
            let domain = source.domain();

            let groups = match source.discover(label, checkpoint).await {
                Ok(groups) => groups,
                Err(err) => {
                    checkpoint.record_error(
                        &format!("{domain}_discovery"),
                        &err.to_string(),
                        Map::new(),
                    );
                    tally.sources_failed += 1;
                    continue;
                }
            };

            for group in &groups {
                export_group(
                    checkpoint,
                    source.as_ref(),
                    sink.as_ref(),
                    label,
                    dry_run,
                    group,
                    &mut tally,
                )
                .await;
            }
            info!(%export_id, %domain, groups = groups.len(), "Finished {domain} content");
        }

        let summary = checkpoint.complete_export()?;
        Ok(ExportReport {
            export_id,
            groups_exported: tally.groups_exported,
            groups_skipped: tally.groups_skipped,
            items_exported: tally.items_exported,
            items_skipped: tally.items_skipped,
            items_failed: tally.items_failed,
            sources_failed: tally.sources_failed,
            documents: tally.documents,
            summary,
        })
    }
}

/// Export the unfinished part of one group.
///
/// Items are marked only once their sections reached the sink, and the group
/// is marked complete only when every item made it.
async fn export_group(
    checkpoint: &mut CheckpointManager,
    source: &dyn ContentSource,
    sink: &dyn DocumentSink,
    label: &str,
    dry_run: bool,
    group: &ContentGroup,
    tally: &mut Tally,
) {
    let domain = source.domain();

    if checkpoint.is_group_complete(domain, &group.key) {
        let missing = count_missing(checkpoint, domain, group);
        if missing > 0 {
            debug!(%domain, group = %group.key, missing, "Completed group has items not in the exported set");
        }
        debug!(%domain, group = %group.key, "Skipping completed {}", domain.group_noun());
        tally.groups_skipped += 1;
        tally.items_skipped += group.items.len();
        return;
    }

    let mut sections = Vec::new();
    let mut rendered = Vec::new();
    let mut failed = 0usize;
    for item in &group.items {
        if checkpoint.is_item_exported(domain, &item.id) {
            tally.items_skipped += 1;
            continue;
        }

        match source.render(item).await {
            Ok(section) => {
                sections.push(section);
                rendered.push(item.id.as_str());
            }
            Err(err) => {
                failed += 1;
                let mut context = Map::new();
                context.insert("group".to_string(), json!(group.key));
                context.insert("item_id".to_string(), json!(item.id));
                context.insert("title".to_string(), json!(item.title));
                checkpoint.record_error(&format!("{domain}_item"), &err.to_string(), context);
            }
        }
    }

    if !sections.is_empty() && !dry_run {
        match sink.write(label, group, &sections).await {
            Ok(Some(path)) => {
                if !tally.documents.contains(&path) {
                    tally.documents.push(path);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%domain, group = %group.key, error = %err, "Failed to write document");
                let mut context = Map::new();
                context.insert("group".to_string(), json!(group.key));
                context.insert("items".to_string(), json!(rendered));
                checkpoint.record_error(&format!("{domain}_write"), &err.to_string(), context);
                tally.items_failed += failed + rendered.len();
                return;
            }
        }
    }

    for item_id in &rendered {
        checkpoint.update_progress(domain, &group.key, item_id);
    }
    tally.items_exported += rendered.len();
    tally.items_failed += failed;

    if failed == 0 {
        checkpoint.mark_group_complete(domain, &group.key);
        tally.groups_exported += 1;
    } else {
        warn!(%domain, group = %group.key, failed, "Leaving {} incomplete", domain.group_noun());
    }
}

fn count_missing(checkpoint: &CheckpointManager, domain: ContentDomain, group: &ContentGroup) -> usize {
    group
        .items
        .iter()
        .filter(|item| !checkpoint.is_item_exported(domain, &item.id))
        .count()
}
