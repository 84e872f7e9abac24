use serde::{Deserialize, Serialize};
use std::fmt;

/// The two content services an export walks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentDomain {
    /// Wiki pages grouped by space
    Wiki,
    /// Tracker issues grouped by project
    Tracker,
}

impl ContentDomain {
    pub const ALL: [ContentDomain; 2] = [ContentDomain::Wiki, ContentDomain::Tracker];

    /// Human readable noun for the grouping container.
    pub fn group_noun(&self) -> &'static str {
        match self {
            ContentDomain::Wiki => "space",
            ContentDomain::Tracker => "project",
        }
    }

    /// Human readable noun for a single exported item.
    pub fn item_noun(&self) -> &'static str {
        match self {
            ContentDomain::Wiki => "page",
            ContentDomain::Tracker => "issue",
        }
    }
}

impl fmt::Display for ContentDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentDomain::Wiki => write!(f, "wiki"),
            ContentDomain::Tracker => write!(f, "tracker"),
        }
    }
}

/// A group of items (space or project) discovered for a label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentGroup {
    pub domain: ContentDomain,
    pub key: String,
    pub name: String,
    pub items: Vec<ContentItem>,
}

impl ContentGroup {
    pub fn new(domain: ContentDomain, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain,
            key: key.into(),
            name: name.into(),
            items: Vec::new(),
        }
    }
}

/// One exportable unit: a page or an issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    /// Source-specific fields the renderer needs (author, status, ...)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Rendered content for one item, ready for a document sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub title: String,
    pub content: String,
}
