//! Issue-creation strategies.
//!
//! Jira deployments disagree about which auth scheme, API version and even
//! which request shape they accept for `POST issue`. Creation walks
//! [`Strategy::CHAIN`] in order and stops at the first success. This is a
//! compatibility chain, not a retry policy: every strategy runs at most
//! once and there is no backoff.

use serde::Serialize;
use std::fmt;

use crate::errors::JiraMailError;
use crate::models::document::Document;
use crate::models::issue::IssueRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// v3 endpoint, rich description, Basic auth, CSRF token if we can get one.
    Standard,
    /// v3 endpoint, Bearer token without username.
    Bearer,
    /// v2 endpoint, description flattened to a string.
    LegacyV2,
    /// Standard request through the raw transport.
    RawTransport,
}

impl Strategy {
    pub const CHAIN: [Strategy; 4] = [
        Strategy::Standard,
        Strategy::Bearer,
        Strategy::LegacyV2,
        Strategy::RawTransport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Standard => "standard",
            Strategy::Bearer => "bearer",
            Strategy::LegacyV2 => "legacy-v2",
            Strategy::RawTransport => "raw-transport",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every failed attempt, in the order they were made.
#[derive(Debug, Default)]
pub struct CreationFailure {
    attempts: Vec<(Strategy, JiraMailError)>,
}

impl CreationFailure {
    pub fn push(&mut self, strategy: Strategy, error: JiraMailError) {
        self.attempts.push((strategy, error));
    }

    pub fn attempts(&self) -> &[(Strategy, JiraMailError)] {
        &self.attempts
    }

    /// The error reported to the user: the one from the last strategy tried.
    pub fn last_error(&self) -> Option<&JiraMailError> {
        self.attempts.last().map(|(_, err)| err)
    }
}

impl fmt::Display for CreationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_error() {
            Some(err) => write!(f, "{}", err),
            None => write!(f, "no issue creation strategy was attempted"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRef {
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueTypeRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueFields<D> {
    pub project: ProjectRef,
    pub summary: String,
    pub description: D,
    pub issuetype: IssueTypeRef,
}

/// Body of `POST issue`. `D` is [`Document`] for v3 and `String` for v2.
#[derive(Debug, Clone, Serialize)]
pub struct IssuePayload<D> {
    pub fields: IssueFields<D>,
}

impl IssuePayload<Document> {
    pub fn rich(request: &IssueRequest) -> Self {
        Self {
            fields: IssueFields {
                project: ProjectRef {
                    key: request.project_key.clone(),
                },
                summary: request.summary.clone(),
                description: Document::paragraph(&request.description),
                issuetype: IssueTypeRef {
                    id: request.issue_type_id.clone(),
                },
            },
        }
    }

    pub fn to_legacy(&self) -> IssuePayload<String> {
        IssuePayload {
            fields: IssueFields {
                project: self.fields.project.clone(),
                summary: self.fields.summary.clone(),
                description: self.fields.description.to_plain_text(),
                issuetype: self.fields.issuetype.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> IssueRequest {
        IssueRequest {
            summary: "Printer on fire".to_string(),
            description: "It burns".to_string(),
            project_key: "OPS".to_string(),
            issue_type_id: "10001".to_string(),
        }
    }

    #[test]
    fn test_chain_order() {
        let names: Vec<_> = Strategy::CHAIN.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["standard", "bearer", "legacy-v2", "raw-transport"]);
    }

    #[test]
    fn test_rich_payload_shape() {
        let value = serde_json::to_value(IssuePayload::rich(&request())).unwrap();
        assert_eq!(value["fields"]["project"], json!({"key": "OPS"}));
        assert_eq!(value["fields"]["issuetype"], json!({"id": "10001"}));
        assert_eq!(value["fields"]["description"]["type"], "doc");
        assert_eq!(
            value["fields"]["description"]["content"][0]["content"][0]["text"],
            "It burns"
        );
    }

    #[test]
    fn test_legacy_payload_has_flat_description() {
        let legacy = IssuePayload::rich(&request()).to_legacy();
        let value = serde_json::to_value(legacy).unwrap();
        assert_eq!(value["fields"]["description"], "It burns");
        assert_eq!(value["fields"]["summary"], "Printer on fire");
    }

    #[test]
    fn test_failure_reports_last_attempt() {
        let mut failure = CreationFailure::default();
        failure.push(Strategy::Standard, JiraMailError::JiraAuthFailed);
        failure.push(
            Strategy::RawTransport,
            JiraMailError::JiraApiError(400, "project is required".to_string()),
        );
        assert_eq!(failure.to_string(), "project is required");
        assert_eq!(failure.attempts().len(), 2);
    }

    #[test]
    fn test_empty_failure_message() {
        let failure = CreationFailure::default();
        assert!(failure.last_error().is_none());
        assert_eq!(failure.to_string(), "no issue creation strategy was attempted");
    }
}
