use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::content::ContentDomain;
use super::ids::ExportId;

/// Progress for one content domain.
///
/// `items_exported` is the idempotent skip marker: membership means the item
/// must not be fetched again. `groups_completed` keeps completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainProgress {
    #[serde(default)]
    pub groups_completed: Vec<String>,
    #[serde(default)]
    pub items_exported: HashSet<String>,
}

impl DomainProgress {
    /// Returns true when the item was newly added.
    pub fn mark_item(&mut self, item_id: impl Into<String>) -> bool {
        self.items_exported.insert(item_id.into())
    }

    /// Returns true when the group was newly appended.
    pub fn mark_group_complete(&mut self, group_key: &str) -> bool {
        if self.is_group_complete(group_key) {
            return false;
        }
        self.groups_completed.push(group_key.to_string());
        true
    }

    pub fn is_item_exported(&self, item_id: &str) -> bool {
        self.items_exported.contains(item_id)
    }

    pub fn is_group_complete(&self, group_key: &str) -> bool {
        self.groups_completed.iter().any(|g| g == group_key)
    }
}

/// An error recorded during an export, persisted with the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// Durable snapshot of one export run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportState {
    pub export_id: ExportId,
    pub label: String,
    pub export_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub profile: String,

    #[serde(default)]
    pub wiki: DomainProgress,
    #[serde(default)]
    pub tracker: DomainProgress,

    #[serde(default)]
    pub current_operation: Option<ContentDomain>,
    #[serde(default)]
    pub current_group_key: Option<String>,
    #[serde(default)]
    pub current_batch_start: u64,

    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

impl ExportState {
    pub fn new(label: impl Into<String>, export_date: NaiveDate, profile: impl Into<String>) -> Self {
        let label = label.into();
        let now = Utc::now();

        Self {
            export_id: ExportId::derive(&label, export_date, now),
            label,
            export_date,
            started_at: now,
            last_updated: now,
            profile: profile.into(),
            wiki: DomainProgress::default(),
            tracker: DomainProgress::default(),
            current_operation: None,
            current_group_key: None,
            current_batch_start: 0,
            errors: Vec::new(),
        }
    }

    pub fn progress(&self, domain: ContentDomain) -> &DomainProgress {
        match domain {
            ContentDomain::Wiki => &self.wiki,
            ContentDomain::Tracker => &self.tracker,
        }
    }

    pub fn progress_mut(&mut self, domain: ContentDomain) -> &mut DomainProgress {
        match domain {
            ContentDomain::Wiki => &mut self.wiki,
            ContentDomain::Tracker => &mut self.tracker,
        }
    }

    /// Total number of items exported across both domains.
    pub fn total_items_exported(&self) -> usize {
        self.wiki.items_exported.len() + self.tracker.items_exported.len()
    }
}
