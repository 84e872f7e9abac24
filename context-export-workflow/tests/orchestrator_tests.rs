// Orchestrator behaviour with in-memory sources and sinks

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use context_export_core::{
    CheckpointConfig, ContentDomain, ContentGroup, ContentItem, Section,
};
use context_export_storage::CheckpointManager;
use context_export_workflow::{
    ContentSource, DiscoveryProgress, DocumentSink, ExportOrchestrator, MarkdownSink, WorkflowError, WorkflowResult,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// ===== Fakes =====

#[derive(Clone, Default)]
struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    fn push(&self, value: impl Into<String>) {
        self.0.lock().unwrap().push(value.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

struct FakeSource {
    domain: ContentDomain,
    groups: Vec<ContentGroup>,
    failing: HashSet<String>,
    fail_discovery: bool,
    fail_lookup: bool,
    rendered: Calls,
}

impl FakeSource {
    fn new(domain: ContentDomain, groups: &[(&str, &[&str])]) -> Self {
        let groups = groups
            .iter()
            .map(|(key, ids)| {
                let mut group = ContentGroup::new(domain, *key, format!("{key} group"));
                group.items = ids.iter().map(|id| item(id)).collect();
                group
            })
            .collect();
        Self {
            domain,
            groups,
            failing: HashSet::new(),
            fail_discovery: false,
            fail_lookup: false,
            rendered: Calls::default(),
        }
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn domain(&self) -> ContentDomain {
        self.domain
    }

    async fn discover(
        &self,
        _label: &str,
        progress: &mut dyn DiscoveryProgress,
    ) -> WorkflowResult<Vec<ContentGroup>> {
        progress.batch_started(0);
        if self.fail_discovery {
            return Err(WorkflowError::Render("search unavailable".to_string()));
        }
        if self.fail_lookup {
            let mut context = serde_json::Map::new();
            context.insert("parent_id".to_string(), serde_json::json!("1"));
            progress.fetch_failed("wiki_child_pages", "children unavailable", context);
        }
        progress.batch_started(25);
        Ok(self.groups.clone())
    }

    async fn render(&self, item: &ContentItem) -> WorkflowResult<Section> {
        self.rendered.push(item.id.clone());
        if self.failing.contains(&item.id) {
            return Err(WorkflowError::Render(format!("cannot render {}", item.id)));
        }
        Ok(Section {
            title: item.title.clone(),
            content: format!("content of {}", item.id),
        })
    }
}

#[derive(Default)]
struct MemorySink {
    writes: Calls,
    fail: bool,
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn write(
        &self,
        _label: &str,
        group: &ContentGroup,
        sections: &[Section],
    ) -> WorkflowResult<Option<PathBuf>> {
        if self.fail {
            return Err(WorkflowError::Io(std::io::Error::other("disk full")));
        }
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        self.writes.push(format!("{}:{}", group.key, titles.join(",")));
        Ok(None)
    }
}

fn item(id: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        title: format!("Title {id}"),
        url: None,
        metadata: serde_json::Map::new(),
    }
}

fn manager(dir: &TempDir) -> CheckpointManager {
    CheckpointManager::new(CheckpointConfig {
        enabled: true,
        checkpoint_dir: dir.path().to_path_buf(),
        checkpoint_interval: 1,
    })
}

fn export_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 30).unwrap()
}

fn started(dir: &TempDir) -> CheckpointManager {
    let mut manager = manager(dir);
    manager.start_new_export("q3", export_date(), "balanced");
    manager
}

// ===== Tests =====

#[tokio::test]
async fn test_fresh_run_exports_every_group() {
    let dir = TempDir::new().unwrap();
    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1", "2"]), ("OPS", &["3"])]);
    let tracker = FakeSource::new(ContentDomain::Tracker, &[("OPS", &["OPS-1"])]);
    let sink = MemorySink::default();
    let writes = sink.writes.clone();

    let mut orchestrator = ExportOrchestrator::new(started(&dir), Box::new(sink), "q3")
        .with_source(Box::new(wiki))
        .with_source(Box::new(tracker));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.groups_exported, 3);
    assert_eq!(report.items_exported, 4);
    assert_eq!(report.items_failed, 0);
    assert_eq!(report.summary.wiki_items, 3);
    assert_eq!(report.summary.tracker_items, 1);
    assert_eq!(
        writes.take(),
        vec!["ENG:Title 1,Title 2", "OPS:Title 3", "OPS:Title OPS-1"]
    );

    let state = orchestrator.checkpoint().state().unwrap();
    assert_eq!(state.wiki.groups_completed, vec!["ENG", "OPS"]);
    assert_eq!(state.current_batch_start, 25);
    assert!(orchestrator.checkpoint().list_checkpoints()[0].completed);
}

#[tokio::test]
async fn test_item_failure_is_recorded_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1", "2", "3"]), ("OPS", &["4"])])
        .failing("2");
    let sink = MemorySink::default();
    let writes = sink.writes.clone();

    let mut orchestrator =
        ExportOrchestrator::new(started(&dir), Box::new(sink), "q3").with_source(Box::new(wiki));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.items_exported, 3);
    assert_eq!(report.items_failed, 1);
    assert_eq!(report.groups_exported, 1);
    assert_eq!(report.summary.error_count, 1);
    assert_eq!(writes.take(), vec!["ENG:Title 1,Title 3", "OPS:Title 4"]);

    let state = orchestrator.checkpoint().state().unwrap();
    assert_eq!(state.wiki.groups_completed, vec!["OPS"]);
    assert!(!state.wiki.is_item_exported("2"));
    let error = &state.errors[0];
    assert_eq!(error.error_type, "wiki_item");
    assert_eq!(error.context["item_id"], "2");
    assert_eq!(error.context["group"], "ENG");
}

#[tokio::test]
async fn test_resumed_run_renders_only_unfinished_work() {
    let dir = TempDir::new().unwrap();

    // An earlier run finished ENG and one item of OPS before stopping
    let path = {
        let mut earlier = started(&dir);
        earlier.update_progress(ContentDomain::Wiki, "ENG", "1");
        earlier.update_progress(ContentDomain::Wiki, "ENG", "2");
        earlier.mark_group_complete(ContentDomain::Wiki, "ENG");
        earlier.update_progress(ContentDomain::Wiki, "OPS", "3");
        earlier.checkpoint_file().unwrap().to_path_buf()
    };

    let mut resumed = manager(&dir);
    resumed.resume_export(&path).unwrap();

    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1", "2"]), ("OPS", &["3", "4"])]);
    let rendered = wiki.rendered.clone();
    let sink = MemorySink::default();
    let writes = sink.writes.clone();

    let mut orchestrator =
        ExportOrchestrator::new(resumed, Box::new(sink), "q3").with_source(Box::new(wiki));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(rendered.take(), vec!["4"]);
    assert_eq!(writes.take(), vec!["OPS:Title 4"]);
    assert_eq!(report.groups_skipped, 1);
    assert_eq!(report.items_skipped, 3);
    assert_eq!(report.summary.wiki_items, 4);

    // The finished run is terminal
    let mut again = manager(&dir);
    assert!(again.resume_export(&path).is_none());
}

#[tokio::test]
async fn test_completed_group_is_trusted_even_with_missing_items() {
    let dir = TempDir::new().unwrap();
    let path = {
        let mut earlier = started(&dir);
        earlier.update_progress(ContentDomain::Tracker, "OPS", "OPS-1");
        earlier.mark_group_complete(ContentDomain::Tracker, "OPS");
        earlier.checkpoint_file().unwrap().to_path_buf()
    };

    let mut resumed = manager(&dir);
    resumed.resume_export(&path).unwrap();

    // OPS-2 was labeled after the group completed
    let tracker = FakeSource::new(ContentDomain::Tracker, &[("OPS", &["OPS-1", "OPS-2"])]);
    let rendered = tracker.rendered.clone();

    let mut orchestrator =
        ExportOrchestrator::new(resumed, Box::new(MemorySink::default()), "q3")
            .with_source(Box::new(tracker));
    let report = orchestrator.run().await.unwrap();

    assert!(rendered.take().is_empty());
    assert_eq!(report.groups_skipped, 1);
    assert_eq!(report.summary.tracker_items, 1);
}

#[tokio::test]
async fn test_dry_run_skips_the_sink() {
    let dir = TempDir::new().unwrap();
    let sink = MemorySink::default();
    let writes = sink.writes.clone();
    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1"])]);

    let mut orchestrator = ExportOrchestrator::new(started(&dir), Box::new(sink), "q3")
        .with_source(Box::new(wiki))
        .dry_run(true);
    let report = orchestrator.run().await.unwrap();

    assert!(writes.take().is_empty());
    assert_eq!(report.items_exported, 1);
    assert!(report.documents.is_empty());
}

#[tokio::test]
async fn test_discovery_failure_moves_to_next_source() {
    let dir = TempDir::new().unwrap();
    let mut wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1"])]);
    wiki.fail_discovery = true;
    let tracker = FakeSource::new(ContentDomain::Tracker, &[("OPS", &["OPS-1"])]);

    let mut orchestrator =
        ExportOrchestrator::new(started(&dir), Box::new(MemorySink::default()), "q3")
            .with_source(Box::new(wiki))
            .with_source(Box::new(tracker));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.sources_failed, 1);
    assert_eq!(report.summary.tracker_items, 1);
    let state = orchestrator.checkpoint().state().unwrap();
    assert_eq!(state.errors[0].error_type, "wiki_discovery");
}

#[tokio::test]
async fn test_lookup_failure_is_recorded_and_export_continues() {
    let dir = TempDir::new().unwrap();
    let mut wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1", "2"])]);
    wiki.fail_lookup = true;

    let mut orchestrator =
        ExportOrchestrator::new(started(&dir), Box::new(MemorySink::default()), "q3")
            .with_source(Box::new(wiki));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.sources_failed, 0);
    assert_eq!(report.items_exported, 2);
    let state = orchestrator.checkpoint().state().unwrap();
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].error_type, "wiki_child_pages");
    assert_eq!(state.errors[0].context["parent_id"], "1");
}

#[tokio::test]
async fn test_sink_failure_leaves_items_unexported() {
    let dir = TempDir::new().unwrap();
    let sink = MemorySink {
        fail: true,
        ..MemorySink::default()
    };
    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1", "2"])]);

    let mut orchestrator =
        ExportOrchestrator::new(started(&dir), Box::new(sink), "q3").with_source(Box::new(wiki));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.items_exported, 0);
    assert_eq!(report.items_failed, 2);
    let state = orchestrator.checkpoint().state().unwrap();
    assert!(state.wiki.items_exported.is_empty());
    assert!(state.wiki.groups_completed.is_empty());
    assert_eq!(state.errors[0].error_type, "wiki_write");
}

#[tokio::test]
async fn test_markdown_sink_collects_documents() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let wiki = FakeSource::new(ContentDomain::Wiki, &[("ENG", &["1"]), ("OPS", &["2"])]);

    let mut orchestrator = ExportOrchestrator::new(
        started(&dir),
        Box::new(MarkdownSink::new(out.path(), export_date())),
        "q3",
    )
    .with_source(Box::new(wiki));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(
        report.documents,
        vec![
            out.path().join("q3/2024-09-30/wiki_ENG.md"),
            out.path().join("q3/2024-09-30/wiki_OPS.md"),
        ]
    );
    let text = std::fs::read_to_string(&report.documents[0]).unwrap();
    assert!(text.contains("## Title 1\n\ncontent of 1"));
}

#[tokio::test]
async fn test_run_without_started_export_fails() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = ExportOrchestrator::new(manager(&dir), Box::new(MemorySink::default()), "q3");

    let result = orchestrator.run().await;
    assert!(matches!(result, Err(WorkflowError::Checkpoint(_))));
}
