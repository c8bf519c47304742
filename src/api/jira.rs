use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::strategy::{CreationFailure, IssuePayload, Strategy};
use super::transport::{FetchTransport, HttpRequest, HttpResponse, HttpTransport, Method, RawTransport};
use crate::config::settings::Settings;
use crate::errors::{JiraMailError, Result};
use crate::models::document::Document;
use crate::models::issue::{
    CreatedIssue, IssueRequest, IssueType, Project, ProjectDetail, ProjectPage, User,
};
use crate::selection::negotiator::IssueTypeSource;

const USER_AGENT: &str = concat!("jiramail/", env!("CARGO_PKG_VERSION"));

/// Response headers a Jira instance may hand its CSRF token back in.
const CSRF_HEADERS: [&str; 3] = ["X-ATLASSIAN-TOKEN", "X-CSRF-TOKEN", "CSRF-Token"];

#[derive(Debug, Clone)]
pub struct Credentials {
    base_url: String,
    username: String,
    api_token: String,
}

impl Credentials {
    pub fn new(base_url: &str, username: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            username: username.trim().to_string(),
            api_token: api_token.trim().to_string(),
        }
    }

    /// `None` unless base URL, username and token are all set.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.is_configured() {
            return None;
        }
        Some(Self::new(
            &settings.jira.url,
            &settings.jira.username,
            &settings.jira.api_token,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn basic(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.api_token));
        format!("Basic {}", encoded)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_token)
    }
}

#[derive(Debug, Clone, Copy)]
enum Auth {
    Basic,
    Bearer,
}

#[derive(Debug)]
pub enum ConnectionTest {
    Success(User),
    Failure(String),
}

pub struct JiraClient {
    credentials: Credentials,
    transport: Arc<dyn HttpTransport>,
    raw_transport: Arc<dyn HttpTransport>,
}

impl JiraClient {
    pub fn new(
        credentials: Credentials,
        transport: Arc<dyn HttpTransport>,
        raw_transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            credentials,
            transport,
            raw_transport,
        }
    }

    /// Client over the real network transports.
    pub fn native(credentials: Credentials) -> Result<Self> {
        Ok(Self::new(
            credentials,
            Arc::new(FetchTransport::new()),
            Arc::new(RawTransport::new()?),
        ))
    }

    pub fn base_url(&self) -> &str {
        self.credentials.base_url()
    }

    fn api_url(&self, version: u8, endpoint: &str) -> String {
        format!("{}/rest/api/{}/{}", self.base_url(), version, endpoint)
    }

    fn build_request(&self, method: Method, url: String, auth: Auth, body: Option<Vec<u8>>) -> HttpRequest {
        let authorization = match auth {
            Auth::Basic => self.credentials.basic(),
            Auth::Bearer => self.credentials.bearer(),
        };

        let headers = vec![
            ("Authorization".to_string(), authorization),
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
            ("X-Atlassian-Token".to_string(), "no-check".to_string()),
            ("Origin".to_string(), self.base_url().to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];

        HttpRequest {
            method,
            url,
            headers,
            body,
        }
    }

    /// Best effort: any failure just means no token.
    async fn csrf_token(&self) -> Option<String> {
        let request = self.build_request(Method::Get, self.api_url(3, "myself"), Auth::Basic, None);
        match self.transport.send(request).await {
            Ok(response) => CSRF_HEADERS
                .iter()
                .find_map(|name| response.header(name))
                .map(str::to_string),
            Err(e) => {
                debug!(error = %e, "could not obtain CSRF token");
                None
            }
        }
    }

    async fn execute(&self, transport: &dyn HttpTransport, request: HttpRequest) -> Result<Vec<u8>> {
        debug!(method = ?request.method, url = %request.url, "jira request");
        let response = transport.send(request).await?;
        debug!(status = response.status, "jira response");

        if !response.is_success() {
            return Err(error_from_response(&response));
        }
        Ok(response.body)
    }

    /// Authenticated v3 call with Basic auth. Writes carry a CSRF token
    /// when the instance offers one.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let mut request = self.build_request(method, self.api_url(3, endpoint), Auth::Basic, body);
        if method.is_write() {
            if let Some(token) = self.csrf_token().await {
                request.headers.push(("X-CSRF-TOKEN".to_string(), token));
            }
        }

        let body = self.execute(self.transport.as_ref(), request).await?;
        parse_json(&body)
    }

    pub async fn test_connection(&self) -> ConnectionTest {
        match self.request_json::<User>(Method::Get, "myself", None).await {
            Ok(user) => ConnectionTest::Success(user),
            Err(e) => ConnectionTest::Failure(e.to_string()),
        }
    }

    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        let page: ProjectPage = self
            .request_json(Method::Get, "project/search?maxResults=100", None)
            .await
            .map_err(|e| e.during("fetch projects"))?;
        Ok(page.values)
    }

    pub async fn get_project_issue_types(&self, project_key: &str) -> Result<Vec<IssueType>> {
        let endpoint = format!("project/{}", urlencoding::encode(project_key));
        let detail: ProjectDetail = self
            .request_json(Method::Get, &endpoint, None)
            .await
            .map_err(|e| e.during(format!("fetch issue types for project {}", project_key)))?;
        Ok(detail.issue_types)
    }

    pub async fn create_issue(&self, request: &IssueRequest) -> Result<CreatedIssue> {
        let payload = IssuePayload::rich(request);
        let mut failure = CreationFailure::default();

        for strategy in Strategy::CHAIN {
            match self.attempt(strategy, &payload).await {
                Ok(issue) => {
                    info!(key = %issue.key, strategy = %strategy, "created jira issue");
                    return Ok(issue);
                }
                Err(e) => {
                    warn!(strategy = %strategy, error = %e, "issue creation strategy failed");
                    failure.push(strategy, e);
                }
            }
        }

        Err(JiraMailError::CreationFailed(failure))
    }

    async fn attempt(&self, strategy: Strategy, payload: &IssuePayload<Document>) -> Result<CreatedIssue> {
        match strategy {
            Strategy::Standard => {
                self.request_json(Method::Post, "issue", Some(to_body(payload)?))
                    .await
            }
            Strategy::Bearer => {
                let request = self.build_request(
                    Method::Post,
                    self.api_url(3, "issue"),
                    Auth::Bearer,
                    Some(to_body(payload)?),
                );
                parse_json(&self.execute(self.transport.as_ref(), request).await?)
            }
            Strategy::LegacyV2 => {
                let request = self.build_request(
                    Method::Post,
                    self.api_url(2, "issue"),
                    Auth::Basic,
                    Some(to_body(&payload.to_legacy())?),
                );
                parse_json(&self.execute(self.transport.as_ref(), request).await?)
            }
            Strategy::RawTransport => {
                let request = self.build_request(
                    Method::Post,
                    self.api_url(3, "issue"),
                    Auth::Basic,
                    Some(to_body(payload)?),
                );
                parse_json(&self.execute(self.raw_transport.as_ref(), request).await?)
            }
        }
    }
}

#[async_trait]
impl IssueTypeSource for JiraClient {
    async fn project_issue_types(&self, project_key: &str) -> Result<Vec<IssueType>> {
        self.get_project_issue_types(project_key).await
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| JiraMailError::Other(format!("Failed to encode request: {}", e)))
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| JiraMailError::InvalidResponse(e.to_string()))
}

/// Turn a non-2xx response into the matching error kind.
pub fn error_from_response(response: &HttpResponse) -> JiraMailError {
    let text = response.text();
    let text = text.trim();

    let mut message = format!("HTTP {}: {}", response.status, response.status_text);
    if !text.is_empty() {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => {
                if let Some(tracker_message) = tracker_message(&json) {
                    message = tracker_message;
                }
            }
            Err(_) => message = format!("{} - {}", message, text),
        }
    }

    match response.status {
        401 => JiraMailError::JiraAuthFailed,
        403 if message.contains("XSRF") || message.contains("CSRF") => JiraMailError::JiraCsrfRejected,
        403 => JiraMailError::JiraAccessDenied,
        404 => JiraMailError::JiraEndpointNotFound,
        status => JiraMailError::JiraApiError(status, message),
    }
}

fn tracker_message(json: &serde_json::Value) -> Option<String> {
    let messages: Vec<&str> = json["errorMessages"]
        .as_array()
        .map(|list| list.iter().filter_map(|m| m.as_str()).collect())
        .unwrap_or_default();
    if !messages.is_empty() {
        return Some(messages.join(", "));
    }

    if let Some(message) = json["message"].as_str() {
        return Some(message.to_string());
    }

    // Field-level validation errors: {"errors": {"summary": "..."}}
    let field_errors: Vec<String> = json["errors"]
        .as_object()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|(field, m)| m.as_str().map(|m| format!("{}: {}", field, m)))
                .collect()
        })
        .unwrap_or_default();
    if !field_errors.is_empty() {
        return Some(field_errors.join(", "));
    }

    None
}
