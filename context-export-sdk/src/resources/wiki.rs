//! Wiki resource client
//!
//! Pages are found with a CQL label search and their bodies read in
//! storage format.

use crate::client::ResilientClient;
use crate::error::SdkResult;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const SEARCH_PATH: &str = "/rest/api/content/search";

/// Client for wiki content
#[derive(Clone)]
pub struct WikiClient {
    client: Arc<ResilientClient>,
}

impl WikiClient {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// One page of content carrying `label`, starting at offset `start`
    pub async fn search_by_label(
        &self,
        label: &str,
        start: u32,
        limit: u32,
    ) -> SdkResult<WikiSearchPage> {
        let params = vec![
            ("cql".to_string(), format!("label = \"{}\"", label)),
            ("expand".to_string(), "space,version".to_string()),
            ("start".to_string(), start.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        self.client.get_json(SEARCH_PATH, &params).await
    }

    /// One page of the direct children of `parent_id`
    pub async fn child_pages(
        &self,
        parent_id: &str,
        start: u32,
        limit: u32,
    ) -> SdkResult<WikiSearchPage> {
        let params = vec![
            ("expand".to_string(), "space,version".to_string()),
            ("start".to_string(), start.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        self.client
            .get_json(&format!("/rest/api/content/{}/child/page", parent_id), &params)
            .await
    }

    /// A page with its storage-format body
    pub async fn page_body(&self, page_id: &str) -> SdkResult<WikiPage> {
        let params = vec![("expand".to_string(), "body.storage,space,version".to_string())];
        self.client
            .get_json(&format!("/rest/api/content/{}", page_id), &params)
            .await
    }

    /// The authenticated user, never served from the cache
    pub async fn current_user(&self) -> SdkResult<Value> {
        self.client
            .request(Method::GET, "/rest/api/user/current", &[], None, false)
            .await?
            .json()
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSearchPage {
    #[serde(default)]
    pub results: Vec<WikiPage>,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(rename = "totalSize", default)]
    pub total_size: Option<u32>,
}

impl WikiSearchPage {
    /// Whether another page may follow this one
    pub fn has_more(&self) -> bool {
        let fetched = self.fetched();
        if fetched == 0 {
            return false;
        }
        match self.total_size {
            Some(total) => self.start.saturating_add(fetched) < total,
            None => fetched >= self.limit,
        }
    }

    /// Results on this page; servers may omit `size`
    pub fn fetched(&self) -> u32 {
        u32::try_from(self.results.len()).unwrap_or(u32::MAX).max(self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPage {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub space: Option<WikiSpace>,
    #[serde(default)]
    pub version: Option<WikiVersion>,
    #[serde(default)]
    pub body: Option<WikiBody>,
    #[serde(rename = "_links", default)]
    pub links: Option<WikiLinks>,
}

impl WikiPage {
    /// Storage-format markup, when the body was expanded
    pub fn storage_html(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.storage.as_ref())
            .map(|s| s.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSpace {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiVersion {
    pub number: u32,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub by: Option<WikiUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiUser {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiBody {
    #[serde(default)]
    pub storage: Option<WikiStorage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiStorage {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiLinks {
    #[serde(default)]
    pub webui: Option<String>,
}
