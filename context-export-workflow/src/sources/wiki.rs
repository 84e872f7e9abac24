use std::collections::HashSet;

use async_trait::async_trait;
use context_export_core::{ContentDomain, ContentGroup, ContentItem, Section};
use context_export_sdk::{SdkResult, WikiClient, WikiPage};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{ContentSource, DiscoveryProgress, GroupCollector};
use crate::error::WorkflowResult;

/// Levels of child pages followed below a labeled page by default
pub const DEFAULT_CHILD_DEPTH: u32 = 4;

/// Wiki pages, grouped by space
pub struct WikiSource {
    client: WikiClient,
    batch_size: u32,
    child_depth: u32,
}

/// A page whose children are still to be fetched
struct Parent {
    id: String,
    space_key: String,
    space_name: String,
    /// Level its children will get
    level: u32,
}

impl WikiSource {
    pub fn new(client: WikiClient, batch_size: u32) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            child_depth: DEFAULT_CHILD_DEPTH,
        }
    }

    /// Follow child pages this many levels deep; 0 exports labeled pages only
    pub fn with_child_depth(mut self, depth: u32) -> Self {
        self.child_depth = depth;
        self
    }

    fn to_item(&self, page: &WikiPage, level: u32, parent_id: Option<&str>) -> ContentItem {
        let mut metadata = Map::new();
        if let Some(version) = &page.version {
            metadata.insert("version".to_string(), json!(version.number));
            if let Some(by) = &version.by {
                metadata.insert("author".to_string(), json!(by.display_name));
            }
            if let Some(when) = &version.when {
                metadata.insert("updated".to_string(), json!(when));
            }
        }
        metadata.insert("level".to_string(), json!(level));
        if let Some(parent_id) = parent_id {
            metadata.insert("parent_id".to_string(), json!(parent_id));
        }

        let base = self.client.client().config().base_url.trim_end_matches('/');
        ContentItem {
            id: page.id.clone(),
            title: page.title.clone(),
            url: page
                .links
                .as_ref()
                .and_then(|l| l.webui.as_ref())
                .map(|webui| format!("{base}{webui}")),
            metadata,
        }
    }

    /// Every direct child of `parent_id`, across result pages
    async fn all_children(&self, parent_id: &str) -> SdkResult<Vec<WikiPage>> {
        let mut children = Vec::new();
        let mut start = 0u32;
        loop {
            let batch = self
                .client
                .child_pages(parent_id, start, self.batch_size)
                .await?;
            let more = batch.has_more();
            let fetched = batch.fetched();
            children.extend(batch.results);
            if !more {
                return Ok(children);
            }
            start = start.saturating_add(fetched);
        }
    }

    /// Walk the page tree below `roots` down to the configured depth.
    ///
    /// Children join their own space's group, or the parent's when the
    /// response carries no space. A page reached twice is kept once and not
    /// walked again. Returns the number of pages added.
    async fn collect_children(
        &self,
        roots: Vec<Parent>,
        seen: &mut HashSet<String>,
        collector: &mut GroupCollector,
        progress: &mut dyn DiscoveryProgress,
    ) -> usize {
        let mut added = 0;
        let mut stack: Vec<Parent> = roots.into_iter().rev().collect();

        while let Some(parent) = stack.pop() {
            if parent.level > self.child_depth {
                continue;
            }

            let children = match self.all_children(&parent.id).await {
                Ok(children) => children,
                Err(err) => {
                    warn!(parent_id = %parent.id, level = parent.level, error = %err, "Failed to fetch child pages");
                    let mut context = Map::new();
                    context.insert("parent_id".to_string(), json!(parent.id));
                    context.insert("level".to_string(), json!(parent.level));
                    progress.fetch_failed("wiki_child_pages", &err.to_string(), context);
                    continue;
                }
            };

            let mut next = Vec::new();
            for child in &children {
                if !seen.insert(child.id.clone()) {
                    continue;
                }
                let (key, name) = match space_of(child) {
                    Some((key, name)) => (key.to_string(), name.to_string()),
                    None => (parent.space_key.clone(), parent.space_name.clone()),
                };
                collector.push(&key, &name, self.to_item(child, parent.level, Some(&parent.id)));
                added += 1;
                next.push(Parent {
                    id: child.id.clone(),
                    space_key: key,
                    space_name: name,
                    level: parent.level.saturating_add(1),
                });
            }
            stack.extend(next.into_iter().rev());
        }

        added
    }
}

/// Space key and display name; an unnamed space is shown by its key
fn space_of(page: &WikiPage) -> Option<(&str, &str)> {
    page.space.as_ref().map(|s| {
        let name = if s.name.is_empty() { s.key.as_str() } else { s.name.as_str() };
        (s.key.as_str(), name)
    })
}

#[async_trait]
impl ContentSource for WikiSource {
    fn domain(&self) -> ContentDomain {
        ContentDomain::Wiki
    }

    async fn discover(
        &self,
        label: &str,
        progress: &mut dyn DiscoveryProgress,
    ) -> WorkflowResult<Vec<ContentGroup>> {
        let mut collector = GroupCollector::new(ContentDomain::Wiki);
        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        let mut start = 0u32;

        loop {
            progress.batch_started(u64::from(start));
            let batch = self
                .client
                .search_by_label(label, start, self.batch_size)
                .await?;
            debug!(start, fetched = batch.fetched(), "Fetched wiki search batch");

            for page in &batch.results {
                if !seen.insert(page.id.clone()) {
                    continue;
                }
                let (key, name) = space_of(page).unwrap_or(("UNKNOWN", "Unknown space"));
                collector.push(key, name, self.to_item(page, 0, None));
                roots.push(Parent {
                    id: page.id.clone(),
                    space_key: key.to_string(),
                    space_name: name.to_string(),
                    level: 1,
                });
            }

            if batch.results.is_empty() || !batch.has_more() {
                break;
            }
            start = start.saturating_add(batch.fetched());
        }

        let pages = roots.len();
        let children = self
            .collect_children(roots, &mut seen, &mut collector, progress)
            .await;

        let groups = collector.finish();
        info!(%label, pages, children, spaces = groups.len(), "Discovered wiki content");
        Ok(groups)
    }

    async fn render(&self, item: &ContentItem) -> WorkflowResult<Section> {
        let page = self.client.page_body(&item.id).await?;

        let mut content = String::new();
        if let Some(Value::String(author)) = item.metadata.get("author") {
            content.push_str(&format!("_Last edited by {author}_\n\n"));
        }
        if let Some(url) = &item.url {
            content.push_str(&format!("Source: {url}\n\n"));
        }
        content.push_str(&storage_to_text(page.storage_html().unwrap_or_default()));

        Ok(Section {
            title: page.title,
            content,
        })
    }
}

/// Reduce storage-format markup to readable text: block tags become line
/// breaks, every other tag is dropped and common entities are decoded.
fn storage_to_text(html: &str) -> String {
    const BLOCK_TAGS: &[&str] = &["p", "br", "li", "tr", "h1", "h2", "h3", "h4", "div"];

    let mut text = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = &rest[open..];
            break;
        };
        let tag = rest[open + 1..open + close]
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&tag.as_str()) && !text.ends_with('\n') {
            text.push('\n');
        }
        rest = &rest[open + close + 1..];
    }
    text.push_str(rest);

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
