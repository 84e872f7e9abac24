//! Document sinks receive the rendered sections of one group at a time.

use async_trait::async_trait;
use chrono::NaiveDate;
use context_export_core::{ContentGroup, Section};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::WorkflowResult;

#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Persist `sections` for `group`. Called once per group per run, and
    /// again by a resumed run for the items it had not finished.
    ///
    /// Returns the document written to, if the sink produces files.
    async fn write(
        &self,
        label: &str,
        group: &ContentGroup,
        sections: &[Section],
    ) -> WorkflowResult<Option<PathBuf>>;
}

/// One markdown file per group under `<root>/<label>/<date>/`.
///
/// Files are appended to, so a resumed run adds its sections after the
/// ones written before the interruption.
#[derive(Debug, Clone)]
pub struct MarkdownSink {
    root: PathBuf,
    export_date: NaiveDate,
}

impl MarkdownSink {
    pub fn new(root: impl Into<PathBuf>, export_date: NaiveDate) -> Self {
        Self {
            root: root.into(),
            export_date,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, label: &str, group: &ContentGroup) -> PathBuf {
        self.root
            .join(file_safe(label))
            .join(self.export_date.to_string())
            .join(format!("{}_{}.md", group.domain, file_safe(&group.key)))
    }
}

#[async_trait]
impl DocumentSink for MarkdownSink {
    async fn write(
        &self,
        label: &str,
        group: &ContentGroup,
        sections: &[Section],
    ) -> WorkflowResult<Option<PathBuf>> {
        let path = self.document_path(label, group);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let is_new = !fs::try_exists(&path).await.unwrap_or(false);
        let mut document = String::new();
        if is_new {
            document.push_str(&format!(
                "# {} {}: {}\n\nLabel: `{}`  \nExported: {}\n",
                group.domain,
                group.domain.group_noun(),
                group.name,
                label,
                self.export_date
            ));
        }
        for section in sections {
            document.push_str(&format!("\n## {}\n\n{}\n", section.title, section.content.trim_end()));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(document.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), sections = sections.len(), "Wrote document");
        Ok(Some(path))
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
