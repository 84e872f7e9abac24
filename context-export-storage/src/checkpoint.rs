//! Durable export progress.
//!
//! One [`CheckpointManager`] owns the [`ExportState`] of a single export run
//! and mirrors it to `checkpoint_<export_id>.json` in the checkpoint
//! directory. Writes go through a temp file and a rename, so the file on disk
//! is always either the previous or the new snapshot. A sibling
//! `checkpoint_<export_id>.complete` marker holds the [`CompletionSummary`]
//! and makes the run terminal: it can no longer be resumed.
//!
//! Routine progress is only written every `checkpoint_interval` updates.
//! Starting a run, completing a group, recording an error and completing the
//! run always write immediately.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use context_export_core::{CheckpointConfig, ContentDomain, ErrorRecord, ExportId, ExportState};

const CHECKPOINT_PREFIX: &str = "checkpoint_";
const CHECKPOINT_EXT: &str = "json";
const MARKER_EXT: &str = "complete";
const TEMP_EXT: &str = "tmp";

/// Errors from loading or finalizing a checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("checkpoint {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("export {0} already completed and cannot be resumed")]
    AlreadyComplete(ExportId),

    #[error("no export is in progress")]
    NoActiveExport,

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where an interrupted run left off
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumePosition {
    pub current_operation: Option<ContentDomain>,
    pub current_group_key: Option<String>,
    pub current_batch_start: u64,
    pub wiki_groups_completed: Vec<String>,
    pub tracker_groups_completed: Vec<String>,
}

/// Contents of the completion marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub export_id: ExportId,
    pub label: String,
    pub completed_at: DateTime<Utc>,
    pub wiki_items: usize,
    pub tracker_items: usize,
    pub error_count: usize,
}

/// One row of [`CheckpointManager::list_checkpoints`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub path: PathBuf,
    pub export_id: ExportId,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub profile: String,
    pub wiki_items: usize,
    pub tracker_items: usize,
    pub wiki_groups: usize,
    pub tracker_groups: usize,
    pub error_count: usize,
    pub completed: bool,
}

pub struct CheckpointManager {
    config: CheckpointConfig,
    state: Option<ExportState>,
    checkpoint_file: Option<PathBuf>,
    save_counter: u32,
}

impl CheckpointManager {
    pub fn new(config: CheckpointConfig) -> Self {
        if config.enabled {
            if let Err(e) = fs::create_dir_all(&config.checkpoint_dir) {
                warn!(
                    dir = %config.checkpoint_dir.display(),
                    error = %e,
                    "Failed to create checkpoint directory"
                );
            }
        }

        Self {
            config,
            state: None,
            checkpoint_file: None,
            save_counter: 0,
        }
    }

    pub fn state(&self) -> Option<&ExportState> {
        self.state.as_ref()
    }

    pub fn checkpoint_file(&self) -> Option<&Path> {
        self.checkpoint_file.as_deref()
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Path of the checkpoint file for an export id
    pub fn checkpoint_path(&self, export_id: &ExportId) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("{CHECKPOINT_PREFIX}{export_id}.{CHECKPOINT_EXT}"))
    }

    pub fn start_new_export(
        &mut self,
        label: &str,
        export_date: NaiveDate,
        profile: &str,
    ) -> &ExportState {
        let mut state = ExportState::new(label, export_date, profile);
        let path = self.checkpoint_path(&state.export_id);

        info!(
            export_id = %state.export_id,
            %label,
            %export_date,
            %profile,
            "Started new export"
        );

        // The initial write counts towards the save interval
        self.save_counter = 1;
        if self.config.enabled {
            persist(&path, &mut state);
        }
        self.checkpoint_file = Some(path);
        self.state.insert(state)
    }

    /// Read a checkpoint file without touching the manager.
    ///
    /// Fails with [`CheckpointError::AlreadyComplete`] when the run's
    /// completion marker exists.
    pub fn load_checkpoint(&self, path: &Path) -> Result<ExportState, CheckpointError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let state: ExportState =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        if marker_path(path).exists() {
            return Err(CheckpointError::AlreadyComplete(state.export_id));
        }
        Ok(state)
    }

    /// Resume from a checkpoint file path, a file name inside the checkpoint
    /// directory, or a bare export id.
    ///
    /// Logs and returns `None` if the checkpoint is missing, unreadable or
    /// already complete.
    pub fn resume_export(&mut self, reference: &Path) -> Option<&ExportState> {
        let path = self.resolve_reference(reference);

        match self.load_checkpoint(&path) {
            Ok(state) => {
                info!(
                    export_id = %state.export_id,
                    label = %state.label,
                    wiki_items = state.wiki.items_exported.len(),
                    tracker_items = state.tracker.items_exported.len(),
                    wiki_groups = state.wiki.groups_completed.len(),
                    tracker_groups = state.tracker.groups_completed.len(),
                    "Resumed export"
                );
                self.checkpoint_file = Some(path);
                self.save_counter = 0;
                self.state = Some(state);
                self.state.as_ref()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to resume export");
                None
            }
        }
    }

    /// Persist the current state.
    ///
    /// Unforced calls only write every `checkpoint_interval` calls. Returns
    /// whether a write happened; failures are logged, never propagated.
    pub fn save_checkpoint(&mut self, force: bool) -> bool {
        let (Some(state), Some(path)) = (self.state.as_mut(), self.checkpoint_file.as_ref()) else {
            return false;
        };

        self.save_counter += 1;
        if !force && self.save_counter % self.config.checkpoint_interval.max(1) != 0 {
            return false;
        }

        if !self.config.enabled {
            state.last_updated = Utc::now();
            return false;
        }
        persist(path, state)
    }

    /// Mark an item exported and note where the run currently is
    pub fn update_progress(&mut self, domain: ContentDomain, group_key: &str, item_id: &str) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        state.current_operation = Some(domain);
        state.current_group_key = Some(group_key.to_string());
        state.progress_mut(domain).mark_item(item_id);
        self.save_checkpoint(false);
    }

    /// Mark a whole group done. Always written immediately.
    pub fn mark_group_complete(&mut self, domain: ContentDomain, group_key: &str) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        if state.progress_mut(domain).mark_group_complete(group_key) {
            info!(
                export_id = %state.export_id,
                %domain,
                group = %group_key,
                "{} complete",
                domain.group_noun()
            );
        }
        self.save_checkpoint(true);
    }

    /// Record the pagination cursor of the current search
    pub fn update_batch_position(&mut self, batch_start: u64) {
        if let Some(state) = self.state.as_mut() {
            state.current_batch_start = batch_start;
        }
    }

    /// Append an error to the run's history. Always written immediately.
    pub fn record_error(
        &mut self,
        error_type: &str,
        message: &str,
        context: serde_json::Map<String, serde_json::Value>,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        warn!(
            export_id = %state.export_id,
            error_type,
            message,
            "Recorded export error"
        );
        state.errors.push(ErrorRecord {
            timestamp: Utc::now(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            context,
        });
        self.save_checkpoint(true);
    }

    pub fn is_item_exported(&self, domain: ContentDomain, item_id: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.progress(domain).is_item_exported(item_id))
    }

    pub fn is_group_complete(&self, domain: ContentDomain, group_key: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.progress(domain).is_group_complete(group_key))
    }

    pub fn resume_position(&self) -> Option<ResumePosition> {
        self.state.as_ref().map(|state| ResumePosition {
            current_operation: state.current_operation,
            current_group_key: state.current_group_key.clone(),
            current_batch_start: state.current_batch_start,
            wiki_groups_completed: state.wiki.groups_completed.clone(),
            tracker_groups_completed: state.tracker.groups_completed.clone(),
        })
    }

    /// Finish the run: final save plus the completion marker.
    pub fn complete_export(&mut self) -> Result<CompletionSummary, CheckpointError> {
        let state = self.state.as_mut().ok_or(CheckpointError::NoActiveExport)?;
        state.current_operation = None;
        state.current_group_key = None;
        self.save_checkpoint(true);

        let state = self.state.as_ref().ok_or(CheckpointError::NoActiveExport)?;
        let summary = CompletionSummary {
            export_id: state.export_id.clone(),
            label: state.label.clone(),
            completed_at: Utc::now(),
            wiki_items: state.wiki.items_exported.len(),
            tracker_items: state.tracker.items_exported.len(),
            error_count: state.errors.len(),
        };

        if self.config.enabled {
            if let Some(path) = &self.checkpoint_file {
                write_atomic(&marker_path(path), &summary)?;
            }
        }

        info!(
            export_id = %summary.export_id,
            wiki_items = summary.wiki_items,
            tracker_items = summary.tracker_items,
            error_count = summary.error_count,
            "Export completed"
        );
        Ok(summary)
    }

    /// Most recently updated checkpoint for a label
    pub fn find_latest_checkpoint(&self, label: &str) -> Option<PathBuf> {
        self.scan()
            .filter(|(_, state)| state.label == label)
            .max_by_key(|(_, state)| state.last_updated)
            .map(|(path, _)| path)
    }

    /// Most recently updated checkpoint for a label that has no completion
    /// marker, i.e. the newest run that can still be resumed
    pub fn find_latest_unfinished(&self, label: &str) -> Option<PathBuf> {
        self.scan()
            .filter(|(path, state)| state.label == label && !marker_path(path).exists())
            .max_by_key(|(_, state)| state.last_updated)
            .map(|(path, _)| path)
    }

    pub fn list_checkpoints(&self) -> Vec<CheckpointSummary> {
        let mut summaries: Vec<CheckpointSummary> = self
            .scan()
            .map(|(path, state)| CheckpointSummary {
                completed: marker_path(&path).exists(),
                path,
                export_id: state.export_id,
                label: state.label,
                started_at: state.started_at,
                last_updated: state.last_updated,
                profile: state.profile,
                wiki_items: state.wiki.items_exported.len(),
                tracker_items: state.tracker.items_exported.len(),
                wiki_groups: state.wiki.groups_completed.len(),
                tracker_groups: state.tracker.groups_completed.len(),
                error_count: state.errors.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        summaries
    }

    /// Delete completed runs whose checkpoint is older than `days_to_keep`.
    ///
    /// Runs without a completion marker are kept regardless of age. Returns
    /// the number of runs removed.
    pub fn cleanup_old_checkpoints(&self, days_to_keep: u32) -> usize {
        let max_age = Duration::from_secs(u64::from(days_to_keep) * 24 * 60 * 60);
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return 0;
        };

        let mut removed = 0;
        for path in self.checkpoint_files() {
            let marker = marker_path(&path);
            if !marker.exists() {
                continue;
            }

            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat checkpoint");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(&path).and_then(|()| fs::remove_file(&marker)) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed old checkpoint");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove checkpoint"),
            }
        }
        removed
    }

    fn resolve_reference(&self, reference: &Path) -> PathBuf {
        if reference.exists() {
            return reference.to_path_buf();
        }

        let in_dir = self.config.checkpoint_dir.join(reference);
        if in_dir.exists() {
            return in_dir;
        }

        match reference.to_str() {
            Some(id) if reference.extension().is_none() => self.checkpoint_path(&ExportId::from(id)),
            _ => reference.to_path_buf(),
        }
    }

    fn checkpoint_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    dir = %self.config.checkpoint_dir.display(),
                    error = %e,
                    "Checkpoint directory not readable"
                );
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                name.starts_with(CHECKPOINT_PREFIX)
                    && path.extension().and_then(|e| e.to_str()) == Some(CHECKPOINT_EXT)
            })
            .collect()
    }

    /// Every readable checkpoint in the directory
    fn scan(&self) -> impl Iterator<Item = (PathBuf, ExportState)> {
        self.checkpoint_files().into_iter().filter_map(|path| {
            let parsed = fs::read(&path)
                .map_err(CheckpointError::from)
                .and_then(|bytes| serde_json::from_slice::<ExportState>(&bytes).map_err(Into::into));
            match parsed {
                Ok(state) => Some((path, state)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                    None
                }
            }
        })
    }

}

fn marker_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension(MARKER_EXT)
}

/// Stamp and write a state, logging the outcome
fn persist(path: &Path, state: &mut ExportState) -> bool {
    state.last_updated = Utc::now();
    match write_atomic(path, state) {
        Ok(()) => {
            debug!(
                export_id = %state.export_id,
                wiki_items = state.wiki.items_exported.len(),
                tracker_items = state.tracker.items_exported.len(),
                "Saved checkpoint"
            );
            true
        }
        Err(e) => {
            error!(export_id = %state.export_id, error = %e, "Failed to save checkpoint");
            false
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(TEMP_EXT);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, interval: u32) -> CheckpointManager {
        CheckpointManager::new(CheckpointConfig {
            enabled: true,
            checkpoint_dir: dir.path().to_path_buf(),
            checkpoint_interval: interval,
        })
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn on_disk(manager: &CheckpointManager) -> ExportState {
        let path = manager.checkpoint_file().unwrap();
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_start_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 10);

        let id = manager.start_new_export("q3", date(), "balanced").export_id.clone();

        let path = manager.checkpoint_file().unwrap();
        assert_eq!(path, dir.path().join(format!("checkpoint_{id}.json")));
        assert_eq!(on_disk(&manager).label, "q3");
    }

    #[test]
    fn test_progress_is_written_at_interval() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 3);
        manager.start_new_export("q3", date(), "balanced");

        // The start write is call 1 of 3
        manager.update_progress(ContentDomain::Wiki, "ENG", "1");
        assert!(on_disk(&manager).wiki.items_exported.is_empty());

        manager.update_progress(ContentDomain::Wiki, "ENG", "2");
        assert_eq!(on_disk(&manager).wiki.items_exported.len(), 2);

        manager.update_progress(ContentDomain::Wiki, "ENG", "3");
        manager.update_progress(ContentDomain::Wiki, "ENG", "4");
        assert_eq!(on_disk(&manager).wiki.items_exported.len(), 2);

        manager.update_progress(ContentDomain::Tracker, "OPS", "OPS-1");
        let persisted = on_disk(&manager);
        assert_eq!(persisted.wiki.items_exported.len(), 4);
        assert_eq!(persisted.current_operation, Some(ContentDomain::Tracker));
        assert_eq!(persisted.current_group_key.as_deref(), Some("OPS"));
    }

    #[test]
    fn test_group_completion_is_durable_immediately() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 1000);
        manager.start_new_export("q3", date(), "fast");

        manager.update_progress(ContentDomain::Tracker, "OPS", "OPS-1");
        manager.mark_group_complete(ContentDomain::Tracker, "OPS");

        let persisted = on_disk(&manager);
        assert_eq!(persisted.tracker.groups_completed, vec!["OPS"]);
        assert!(persisted.tracker.items_exported.contains("OPS-1"));
        assert!(manager.is_group_complete(ContentDomain::Tracker, "OPS"));
        assert!(!manager.is_group_complete(ContentDomain::Wiki, "OPS"));
    }

    #[test]
    fn test_record_error_is_durable_immediately() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 1000);
        manager.start_new_export("q3", date(), "balanced");

        let mut context = serde_json::Map::new();
        context.insert("page_id".to_string(), serde_json::json!("101"));
        manager.record_error("wiki_page", "timed out", context);

        let persisted = on_disk(&manager);
        assert_eq!(persisted.errors.len(), 1);
        assert_eq!(persisted.errors[0].error_type, "wiki_page");
        assert_eq!(persisted.errors[0].context["page_id"], "101");
    }

    #[test]
    fn test_resume_restores_exported_sets() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut manager = manager(&dir, 1);
            manager.start_new_export("q3", date(), "balanced");
            manager.update_progress(ContentDomain::Wiki, "ENG", "42");
            manager.update_batch_position(50);
            manager.checkpoint_file().unwrap().to_path_buf()
        };

        let mut resumed = manager(&dir, 1);
        let state = resumed.resume_export(&path).unwrap();
        assert_eq!(state.label, "q3");

        assert!(resumed.is_item_exported(ContentDomain::Wiki, "42"));
        assert!(!resumed.is_item_exported(ContentDomain::Tracker, "42"));

        let position = resumed.resume_position().unwrap();
        assert_eq!(position.current_operation, Some(ContentDomain::Wiki));
        assert_eq!(position.current_group_key.as_deref(), Some("ENG"));
    }

    #[test]
    fn test_resume_by_file_name_and_export_id() {
        let dir = TempDir::new().unwrap();
        let id = {
            let mut manager = manager(&dir, 1);
            manager.start_new_export("q3", date(), "balanced").export_id.clone()
        };

        let mut by_name = manager(&dir, 1);
        assert!(by_name
            .resume_export(Path::new(&format!("checkpoint_{id}.json")))
            .is_some());

        let mut by_id = manager(&dir, 1);
        assert!(by_id.resume_export(Path::new(id.as_str())).is_some());
    }

    #[test]
    fn test_resume_failures_return_none() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 1);

        assert!(manager.resume_export(&dir.path().join("nope.json")).is_none());

        let corrupt = dir.path().join("checkpoint_bad.json");
        fs::write(&corrupt, b"{ truncated").unwrap();
        assert!(manager.resume_export(&corrupt).is_none());
        assert!(matches!(
            manager.load_checkpoint(&corrupt),
            Err(CheckpointError::Corrupt { .. })
        ));
        assert!(manager.state().is_none());
    }

    #[test]
    fn test_completed_export_cannot_be_resumed() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 10);
        manager.start_new_export("q3", date(), "balanced");
        manager.update_progress(ContentDomain::Wiki, "ENG", "1");
        manager.update_progress(ContentDomain::Tracker, "OPS", "OPS-1");

        let summary = manager.complete_export().unwrap();
        assert_eq!(summary.wiki_items, 1);
        assert_eq!(summary.tracker_items, 1);
        assert_eq!(summary.error_count, 0);

        let path = manager.checkpoint_file().unwrap().to_path_buf();
        let marker: CompletionSummary =
            serde_json::from_slice(&fs::read(path.with_extension("complete")).unwrap()).unwrap();
        assert_eq!(marker, summary);
        assert_eq!(on_disk(&manager).current_operation, None);

        assert!(matches!(
            manager.load_checkpoint(&path),
            Err(CheckpointError::AlreadyComplete(_))
        ));
        let mut other = CheckpointManager::new(manager.config.clone());
        assert!(other.resume_export(&path).is_none());
    }

    #[test]
    fn test_complete_without_export_fails() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 10);

        assert!(matches!(
            manager.complete_export(),
            Err(CheckpointError::NoActiveExport)
        ));
    }

    #[test]
    fn test_find_latest_and_list() {
        let dir = TempDir::new().unwrap();
        let mut first = manager(&dir, 1);
        first.start_new_export("q3", date(), "balanced");
        std::thread::sleep(Duration::from_millis(5));
        let mut second = manager(&dir, 1);
        second.start_new_export("q3", date(), "fast");
        let mut other_label = manager(&dir, 1);
        other_label.start_new_export("q4", date(), "balanced");

        let latest = first.find_latest_checkpoint("q3").unwrap();
        assert_eq!(latest, second.checkpoint_file().unwrap());
        assert!(first.find_latest_checkpoint("missing").is_none());

        // Touching the older run makes it the latest
        first.update_progress(ContentDomain::Wiki, "ENG", "1");
        assert_eq!(
            first.find_latest_checkpoint("q3").unwrap(),
            first.checkpoint_file().unwrap()
        );

        let listed = first.list_checkpoints();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|c| !c.completed));
        assert_eq!(listed[0].wiki_items, 1);
    }

    #[test]
    fn test_latest_unfinished_skips_newer_completed_run() {
        let dir = TempDir::new().unwrap();
        let mut interrupted = manager(&dir, 1);
        interrupted.start_new_export("q3", date(), "balanced");
        std::thread::sleep(Duration::from_millis(5));
        let mut finished = manager(&dir, 1);
        finished.start_new_export("q3", date(), "balanced");
        finished.complete_export().unwrap();

        assert_eq!(
            finished.find_latest_checkpoint("q3").unwrap(),
            finished.checkpoint_file().unwrap()
        );
        assert_eq!(
            finished.find_latest_unfinished("q3").unwrap(),
            interrupted.checkpoint_file().unwrap()
        );
        assert!(finished.find_latest_unfinished("q4").is_none());
    }

    #[test]
    fn test_cleanup_only_removes_old_completed_runs() {
        let dir = TempDir::new().unwrap();
        let age = |path: &Path| {
            let old = SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60);
            fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(old)
                .unwrap();
        };

        let mut done = manager(&dir, 1);
        done.start_new_export("old-done", date(), "balanced");
        done.complete_export().unwrap();
        age(done.checkpoint_file().unwrap());

        let mut unfinished = manager(&dir, 1);
        unfinished.start_new_export("old-unfinished", date(), "balanced");
        age(unfinished.checkpoint_file().unwrap());

        let mut recent = manager(&dir, 1);
        recent.start_new_export("recent-done", date(), "balanced");
        recent.complete_export().unwrap();

        assert_eq!(done.cleanup_old_checkpoints(7), 1);
        assert!(!done.checkpoint_file().unwrap().exists());
        assert!(unfinished.checkpoint_file().unwrap().exists());
        assert!(recent.checkpoint_file().unwrap().exists());
    }

    #[test]
    fn test_disabled_manager_tracks_in_memory_only() {
        let dir = TempDir::new().unwrap();
        let checkpoint_dir = dir.path().join("never-created");
        let mut manager = CheckpointManager::new(CheckpointConfig {
            enabled: false,
            checkpoint_dir: checkpoint_dir.clone(),
            checkpoint_interval: 1,
        });

        manager.start_new_export("q3", date(), "balanced");
        manager.update_progress(ContentDomain::Wiki, "ENG", "1");
        manager.mark_group_complete(ContentDomain::Wiki, "ENG");

        assert!(manager.is_item_exported(ContentDomain::Wiki, "1"));
        assert!(manager.complete_export().is_ok());
        assert!(!checkpoint_dir.exists());
    }

    #[test]
    fn test_updates_without_export_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir, 1);

        manager.update_progress(ContentDomain::Wiki, "ENG", "1");
        manager.mark_group_complete(ContentDomain::Wiki, "ENG");
        assert!(!manager.save_checkpoint(true));
        assert!(!manager.is_item_exported(ContentDomain::Wiki, "1"));
        assert!(manager.resume_position().is_none());
    }
}
