//! Jira's structured description format (Atlassian Document Format).
//!
//! The v3 API wants descriptions as a `doc` node holding block nodes; the
//! legacy v2 API takes a flat string. We only ever produce a single
//! paragraph, but flattening accepts any number of paragraphs and runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    #[serde(default)]
    pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Document {
    /// One paragraph holding one text run.
    pub fn paragraph(text: &str) -> Self {
        Self {
            kind: "doc".to_string(),
            version: 1,
            content: vec![Node {
                kind: "paragraph".to_string(),
                content: vec![Node {
                    kind: "text".to_string(),
                    content: Vec::new(),
                    text: Some(text.to_string()),
                }],
                text: None,
            }],
        }
    }

    /// Flatten to the plain string the v2 API expects.
    ///
    /// Runs inside a block are concatenated; blocks are separated by a
    /// blank line. Non-text inline nodes contribute nothing.
    pub fn to_plain_text(&self) -> String {
        self.content
            .iter()
            .map(Node::inline_text)
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Node {
    fn inline_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        self.content.iter().map(Node::inline_text).collect()
    }
}
