pub mod tracker;
pub mod wiki;

pub use tracker::TrackerSource;
pub use wiki::WikiSource;

use async_trait::async_trait;
use context_export_core::{ContentDomain, ContentGroup, ContentItem, Section};
use context_export_storage::CheckpointManager;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::WorkflowResult;

/// Receives pagination cursors and non-fatal fetch failures while a source
/// walks its content.
pub trait DiscoveryProgress: Send {
    /// Called with the offset of each search page before it is fetched
    fn batch_started(&mut self, start: u64);

    /// A secondary fetch failed; discovery carries on without its results
    fn fetch_failed(&mut self, operation: &str, error: &str, context: Map<String, Value>);
}

impl DiscoveryProgress for CheckpointManager {
    fn batch_started(&mut self, start: u64) {
        self.update_batch_position(start);
    }

    fn fetch_failed(&mut self, operation: &str, error: &str, context: Map<String, Value>) {
        self.record_error(operation, error, context);
    }
}

/// Where labeled content comes from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn domain(&self) -> ContentDomain;

    /// Walk every search page for `label` and group the items.
    ///
    /// A failed search page fails the whole discovery. Failures of
    /// secondary lookups are reported through `progress` instead.
    async fn discover(
        &self,
        label: &str,
        progress: &mut dyn DiscoveryProgress,
    ) -> WorkflowResult<Vec<ContentGroup>>;

    /// Fetch one item's full content and format it.
    async fn render(&self, item: &ContentItem) -> WorkflowResult<Section>;
}

/// Builds groups in first-seen order while pages are walked
pub(crate) struct GroupCollector {
    domain: ContentDomain,
    groups: Vec<ContentGroup>,
    index: HashMap<String, usize>,
}

impl GroupCollector {
    pub(crate) fn new(domain: ContentDomain) -> Self {
        Self {
            domain,
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn push(&mut self, key: &str, name: &str, item: ContentItem) {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(ContentGroup::new(self.domain, key, name));
                self.index.insert(key.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        let group = &mut self.groups[slot];
        // Search pages can overlap when content changes mid-walk
        if !group.items.iter().any(|existing| existing.id == item.id) {
            group.items.push(item);
        }
    }

    pub(crate) fn finish(self) -> Vec<ContentGroup> {
        self.groups
    }
}
