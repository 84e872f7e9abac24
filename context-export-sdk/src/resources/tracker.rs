//! Issue tracker resource client

use crate::client::ResilientClient;
use crate::error::SdkResult;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const SEARCH_PATH: &str = "/rest/api/2/search";

/// Fields requested for every issue in a label search
pub const DEFAULT_FIELDS: &[&str] = &[
    "summary",
    "status",
    "assignee",
    "reporter",
    "description",
    "project",
    "priority",
    "labels",
    "issuetype",
    "created",
    "updated",
];

/// Client for tracker issues
#[derive(Clone)]
pub struct TrackerClient {
    client: Arc<ResilientClient>,
}

impl TrackerClient {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// One page of issues carrying `label`
    pub async fn search_by_label(
        &self,
        label: &str,
        start_at: u32,
        max_results: u32,
        fields: &[&str],
    ) -> SdkResult<TrackerSearchPage> {
        let params = vec![
            ("jql".to_string(), format!("labels = \"{}\"", label)),
            ("startAt".to_string(), start_at.to_string()),
            ("maxResults".to_string(), max_results.to_string()),
            ("fields".to_string(), fields.join(",")),
        ];
        self.client.get_json(SEARCH_PATH, &params).await
    }

    /// A single issue including its comments
    pub async fn issue(&self, key: &str) -> SdkResult<TrackerIssue> {
        let mut fields = DEFAULT_FIELDS.to_vec();
        fields.push("comment");
        let params = vec![("fields".to_string(), fields.join(","))];
        self.client
            .get_json(&format!("/rest/api/2/issue/{}", key), &params)
            .await
    }

    /// The authenticated user, never served from the cache
    pub async fn myself(&self) -> SdkResult<Value> {
        self.client
            .request(Method::GET, "/rest/api/2/myself", &[], None, false)
            .await?
            .json()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSearchPage {
    #[serde(default)]
    pub issues: Vec<TrackerIssue>,
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
}

impl TrackerSearchPage {
    pub fn has_more(&self) -> bool {
        let fetched = u32::try_from(self.issues.len()).unwrap_or(u32::MAX);
        fetched > 0 && self.start_at.saturating_add(fetched) < self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub id: String,
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<NamedField>,
    pub project: TrackerProject,
    #[serde(default)]
    pub assignee: Option<TrackerUser>,
    #[serde(default)]
    pub reporter: Option<TrackerUser>,
    #[serde(default)]
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub issuetype: Option<NamedField>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub comment: Option<CommentPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerProject {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUser {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub author: Option<TrackerUser>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_deserialization_tolerates_nulls() {
        let json = r#"{
            "id": "10001",
            "key": "ENG-1",
            "fields": {
                "summary": "Fix login",
                "description": null,
                "status": {"name": "Done"},
                "project": {"key": "ENG", "name": "Engineering"},
                "assignee": null,
                "labels": ["quarterly"]
            }
        }"#;

        let issue: TrackerIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.fields.project.key, "ENG");
        assert!(issue.fields.assignee.is_none());
        assert_eq!(issue.fields.status.unwrap().name, "Done");
    }

    #[test]
    fn test_has_more() {
        let json = r#"{"issues": [{"id": "1", "key": "A-1", "fields": {"project": {"key": "A"}}}],
                       "startAt": 0, "maxResults": 1, "total": 2}"#;
        let page: TrackerSearchPage = serde_json::from_str(json).unwrap();
        assert!(page.has_more());

        let last = TrackerSearchPage { start_at: 1, ..page.clone() };
        assert!(!last.has_more());

        let far = TrackerSearchPage { start_at: u32::MAX, total: u32::MAX, ..page };
        assert!(!far.has_more());
    }
}
