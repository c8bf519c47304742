use serde::{Deserialize, Serialize};

/// One node of a message body tree. A part with children is a container;
/// otherwise it is a leaf carrying a content type and a body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessagePart {
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Plain,
    Html,
}

impl MessagePart {
    #[cfg(test)]
    pub fn leaf(content_type: &str, body: &str) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            body: Some(body.to_string()),
            parts: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn container(content_type: &str, parts: Vec<MessagePart>) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            body: None,
            parts,
        }
    }

    pub fn is_container(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Text kind of this part, ignoring case and MIME parameters.
    pub fn leaf_kind(&self) -> Option<LeafKind> {
        let content_type = self.content_type.as_deref()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" => Some(LeafKind::Plain),
            "text/html" => Some(LeafKind::Html),
            _ => None,
        }
    }

    /// Body if present and non-empty.
    pub fn text_body(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.is_empty())
    }

    /// Every part of the tree, depth-first, children left to right.
    pub fn walk(&self) -> Vec<&MessagePart> {
        let mut out = vec![self];
        for child in &self.parts {
            out.extend(child.walk());
        }
        out
    }
}

/// An exported message as the mail host hands it over.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    /// Falls back to the file name when missing.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: MessagePart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
}
