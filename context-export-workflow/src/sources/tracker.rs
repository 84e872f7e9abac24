use async_trait::async_trait;
use context_export_core::{ContentDomain, ContentGroup, ContentItem, Section};
use context_export_sdk::resources::tracker::DEFAULT_FIELDS;
use context_export_sdk::{TrackerClient, TrackerIssue};
use serde_json::{json, Map};
use std::fmt::Write as _;
use tracing::{debug, info};

use super::{ContentSource, DiscoveryProgress, GroupCollector};
use crate::error::WorkflowResult;

/// Tracker issues, grouped by project
pub struct TrackerSource {
    client: TrackerClient,
    batch_size: u32,
}

impl TrackerSource {
    pub fn new(client: TrackerClient, batch_size: u32) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    fn to_item(&self, issue: &TrackerIssue) -> ContentItem {
        let fields = &issue.fields;
        let mut metadata = Map::new();
        if let Some(status) = &fields.status {
            metadata.insert("status".to_string(), json!(status.name));
        }
        if let Some(kind) = &fields.issuetype {
            metadata.insert("type".to_string(), json!(kind.name));
        }
        if let Some(updated) = &fields.updated {
            metadata.insert("updated".to_string(), json!(updated));
        }

        let base = self.client.client().config().base_url.trim_end_matches('/');
        ContentItem {
            id: issue.key.clone(),
            title: fields.summary.clone(),
            url: Some(format!("{base}/browse/{}", issue.key)),
            metadata,
        }
    }
}

#[async_trait]
impl ContentSource for TrackerSource {
    fn domain(&self) -> ContentDomain {
        ContentDomain::Tracker
    }

    async fn discover(
        &self,
        label: &str,
        progress: &mut dyn DiscoveryProgress,
    ) -> WorkflowResult<Vec<ContentGroup>> {
        let mut collector = GroupCollector::new(ContentDomain::Tracker);
        let mut start_at = 0u32;
        let mut issues = 0usize;

        loop {
            progress.batch_started(u64::from(start_at));
            let batch = self
                .client
                .search_by_label(label, start_at, self.batch_size, DEFAULT_FIELDS)
                .await?;
            debug!(start_at, total = batch.total, "Fetched tracker search batch");

            for issue in &batch.issues {
                let project = &issue.fields.project;
                let name = if project.name.is_empty() {
                    project.key.as_str()
                } else {
                    project.name.as_str()
                };
                collector.push(&project.key, name, self.to_item(issue));
            }
            issues += batch.issues.len();

            if !batch.has_more() {
                break;
            }
            start_at = start_at.saturating_add(u32::try_from(batch.issues.len()).unwrap_or(u32::MAX));
        }

        let groups = collector.finish();
        info!(%label, issues, projects = groups.len(), "Discovered tracker content");
        Ok(groups)
    }

    async fn render(&self, item: &ContentItem) -> WorkflowResult<Section> {
        let issue = self.client.issue(&item.id).await?;
        Ok(Section {
            title: format!("{}: {}", issue.key, issue.fields.summary),
            content: format_issue(&issue, item.url.as_deref()),
        })
    }
}

fn format_issue(issue: &TrackerIssue, url: Option<&str>) -> String {
    let fields = &issue.fields;
    let mut out = String::new();

    let name_or = |field: Option<&str>| field.unwrap_or("Unknown").to_string();
    let _ = writeln!(
        out,
        "- **Status:** {}",
        name_or(fields.status.as_ref().map(|s| s.name.as_str()))
    );
    let _ = writeln!(
        out,
        "- **Type:** {}",
        name_or(fields.issuetype.as_ref().map(|s| s.name.as_str()))
    );
    if let Some(priority) = &fields.priority {
        let _ = writeln!(out, "- **Priority:** {}", priority.name);
    }
    let _ = writeln!(
        out,
        "- **Assignee:** {}",
        fields
            .assignee
            .as_ref()
            .map(|u| u.display_name.as_str())
            .unwrap_or("Unassigned")
    );
    if let Some(reporter) = &fields.reporter {
        let _ = writeln!(out, "- **Reporter:** {}", reporter.display_name);
    }
    if !fields.labels.is_empty() {
        let _ = writeln!(out, "- **Labels:** {}", fields.labels.join(", "));
    }
    if let Some(url) = url {
        let _ = writeln!(out, "- **Link:** {url}");
    }

    out.push_str("\n### Description\n\n");
    match fields.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => out.push_str(text),
        _ => out.push_str("_No description_"),
    }
    out.push('\n');

    let comments = fields
        .comment
        .as_ref()
        .map(|page| page.comments.as_slice())
        .unwrap_or_default();
    if !comments.is_empty() {
        out.push_str("\n### Comments\n");
        for comment in comments {
            let author = comment
                .author
                .as_ref()
                .map(|a| a.display_name.as_str())
                .unwrap_or("Unknown");
            let when = comment.created.as_deref().unwrap_or("");
            let _ = write!(out, "\n**{author}** {when}\n\n{}\n", comment.body.trim());
        }
    }

    out
}
