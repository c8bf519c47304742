use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::{JiraMailError, Result};
use crate::models::email::{Message, MessagePart, MessageSummary};

/// Where messages come from.
#[async_trait]
pub trait MailHost: Send + Sync {
    async fn get_message(&self, id: &str) -> Result<MessageSummary>;

    async fn get_full(&self, id: &str) -> Result<MessagePart>;
}

/// Mailbox export on disk: one `<id>.json` file per message.
pub struct JsonMailbox {
    dir: PathBuf,
}

impl JsonMailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Ids of every exported message, sorted.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read mailbox {}", self.dir.display()))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load(&self, id: &str) -> Result<Message> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(JiraMailError::MessageNotFound(id.to_string()));
        }

        let path = self.dir.join(format!("{}.json", id));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JiraMailError::MessageNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut message: Message = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse message file {}", path.display()))?;
        if message.id.is_empty() {
            message.id = id.to_string();
        }
        Ok(message)
    }
}

#[async_trait]
impl MailHost for JsonMailbox {
    async fn get_message(&self, id: &str) -> Result<MessageSummary> {
        let message = self.load(id).await?;
        Ok(MessageSummary {
            id: message.id,
            subject: message.subject,
        })
    }

    async fn get_full(&self, id: &str) -> Result<MessagePart> {
        Ok(self.load(id).await?.body)
    }
}
