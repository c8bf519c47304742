use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::kv::KeyValueStore;
use crate::models::issue::CreatedIssue;

const KEY_PREFIX: &str = "jira_link_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkRecord {
    pub key: String,
    pub url: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Which issue was created from which email. One record per email; a new
/// record replaces the old one.
pub struct LinkStore {
    store: Arc<dyn KeyValueStore>,
    base_url: String,
}

impl LinkStore {
    pub fn new(store: Arc<dyn KeyValueStore>, base_url: &str) -> Self {
        Self {
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn storage_key(email_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, email_id)
    }

    /// `canonical_url` wins when given; otherwise the browse URL is built
    /// from the base URL and issue key.
    pub async fn store(
        &self,
        email_id: &str,
        issue: &CreatedIssue,
        canonical_url: Option<&str>,
    ) -> Result<LinkRecord> {
        let record = LinkRecord {
            key: issue.key.clone(),
            url: canonical_url
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}/browse/{}", self.base_url, issue.key)),
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&record)?;
        self.store
            .set(&Self::storage_key(email_id), value)
            .await
            .with_context(|| format!("Failed to store link for message {}", email_id))?;
        debug!(email_id, key = %record.key, "stored issue link");

        Ok(record)
    }

    pub async fn get(&self, email_id: &str) -> Result<Option<LinkRecord>> {
        match self.store.get(&Self::storage_key(email_id)).await? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).context("Malformed link record")?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;

    fn issue(key: &str) -> CreatedIssue {
        CreatedIssue {
            id: "1".to_string(),
            key: key.to_string(),
            self_url: format!("https://x/rest/api/3/issue/{}", key),
        }
    }

    #[tokio::test]
    async fn test_store_builds_browse_url() {
        let links = LinkStore::new(Arc::new(MemoryStore::new()), "https://x/");
        let record = links.store("msg-1", &issue("ENG-7"), None).await.unwrap();
        assert_eq!(record.url, "https://x/browse/ENG-7");
        assert_eq!(links.get("msg-1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_store_prefers_canonical_url() {
        let links = LinkStore::new(Arc::new(MemoryStore::new()), "https://x");
        let record = links
            .store("msg-1", &issue("ENG-7"), Some("https://x/jira/ENG-7"))
            .await
            .unwrap();
        assert_eq!(record.url, "https://x/jira/ENG-7");
    }

    #[tokio::test]
    async fn test_second_store_replaces_first() {
        let links = LinkStore::new(Arc::new(MemoryStore::new()), "https://x");
        links.store("msg-1", &issue("ENG-1"), None).await.unwrap();
        links.store("msg-1", &issue("ENG-2"), None).await.unwrap();

        let record = links.get("msg-1").await.unwrap().unwrap();
        assert_eq!(record.key, "ENG-2");
    }

    #[tokio::test]
    async fn test_missing_link_is_none() {
        let links = LinkStore::new(Arc::new(MemoryStore::new()), "https://x");
        assert_eq!(links.get("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persisted_format() {
        let kv = Arc::new(MemoryStore::new());
        let links = LinkStore::new(kv.clone(), "https://x");
        links.store("42", &issue("ENG-7"), None).await.unwrap();

        let raw = kv.get("jira_link_42").await.unwrap().unwrap();
        assert_eq!(raw["key"], "ENG-7");
        assert_eq!(raw["url"], "https://x/browse/ENG-7");
        let created_at = raw["createdAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created_at).is_ok());
    }
}
