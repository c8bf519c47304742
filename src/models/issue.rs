use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IssueType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtask: bool,
}

/// Page returned by `project/search`.
#[derive(Debug, Deserialize)]
pub struct ProjectPage {
    #[serde(default)]
    pub values: Vec<Project>,
}

/// The slice of `project/{key}` we care about.
#[derive(Debug, Deserialize)]
pub struct ProjectDetail {
    #[serde(default, rename = "issueTypes")]
    pub issue_types: Vec<IssueType>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<String>,
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
}

/// What the orchestrator asks the tracker to create for one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub summary: String,
    pub description: String,
    pub project_key: String,
    pub issue_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
    #[serde(rename = "self")]
    pub self_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_type_defaults() {
        let issue_type: IssueType =
            serde_json::from_str(r#"{"id":"10001","name":"Task"}"#).unwrap();
        assert_eq!(issue_type.description, None);
        assert!(!issue_type.subtask);
    }

    #[test]
    fn test_created_issue_reads_self() {
        let issue: CreatedIssue = serde_json::from_str(
            r#"{"id":"123","key":"ENG-7","self":"https://x/rest/api/3/issue/123"}"#,
        )
        .unwrap();
        assert_eq!(issue.key, "ENG-7");
        assert_eq!(issue.self_url, "https://x/rest/api/3/issue/123");
    }

    #[test]
    fn test_project_detail_issue_types() {
        let detail: ProjectDetail = serde_json::from_str(
            r#"{"key":"ENG","issueTypes":[{"id":"1","name":"Bug","subtask":false},{"id":"2","name":"Sub-task","subtask":true}]}"#,
        )
        .unwrap();
        assert_eq!(detail.issue_types.len(), 2);
        assert!(detail.issue_types[1].subtask);
    }
}
