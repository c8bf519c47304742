//! One "send to Jira" action: for every selected message, extract its
//! text, let the user pick a project and issue type, create the issue and
//! remember the link. A failing message is reported and skipped; the rest
//! of the batch still runs. An unanswered selection dialog ends the batch,
//! since its prompt may still own the terminal.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::jira::{Credentials, JiraClient};
use crate::api::transport::HttpTransport;
use crate::config::settings::Settings;
use crate::errors::Result;
use crate::mail::extract::{extract_with, ExtractOptions};
use crate::mail::host::MailHost;
use crate::models::issue::IssueRequest;
use crate::notify::Notifier;
use crate::selection::negotiator::{SelectionNegotiator, SelectionOutcome, SelectionUi};
use crate::storage::kv::KeyValueStore;
use crate::storage::links::{LinkRecord, LinkStore};

pub const TITLE: &str = "Jira Connector";
pub const CREATED_TITLE: &str = "Jira Issue Created";
pub const ERROR_TITLE: &str = "Jira Connector - Error";

const NO_SUBJECT: &str = "(no subject)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(LinkRecord),
    Cancelled,
    /// The selection dialog went unanswered; the rest of the batch was not run.
    TimedOut,
}

#[derive(Debug)]
pub struct MessageReport {
    pub message_id: String,
    /// `Err` holds the message shown to the user.
    pub result: std::result::Result<Outcome, String>,
}

pub struct Collaborators {
    pub mail: Arc<dyn MailHost>,
    pub ui: Arc<dyn SelectionUi>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn KeyValueStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub raw_transport: Arc<dyn HttpTransport>,
}

pub struct Orchestrator {
    settings: Settings,
    deps: Collaborators,
    negotiator: SelectionNegotiator,
    open_created: bool,
}

impl Orchestrator {
    pub fn new(settings: Settings, deps: Collaborators) -> Self {
        let timeout = settings
            .preferences
            .selection_timeout_secs
            .map(Duration::from_secs);
        Self {
            settings,
            deps,
            negotiator: SelectionNegotiator::new(timeout),
            open_created: false,
        }
    }

    /// Open each created issue in the browser.
    pub fn open_created(mut self, open: bool) -> Self {
        self.open_created = open;
        self
    }

    pub async fn run(&self, message_ids: &[String]) -> Vec<MessageReport> {
        let Some(credentials) = Credentials::from_settings(&self.settings) else {
            self.deps.notifier.notify(
                TITLE,
                "Please configure Jira settings first.",
            );
            self.deps.notifier.open_configuration();
            return Vec::new();
        };

        if message_ids.is_empty() {
            self.deps.notifier.notify(TITLE, "No emails selected.");
            return Vec::new();
        }

        let client = JiraClient::new(
            credentials,
            self.deps.transport.clone(),
            self.deps.raw_transport.clone(),
        );
        let links = LinkStore::new(self.deps.store.clone(), client.base_url());

        let mut reports = Vec::with_capacity(message_ids.len());
        for message_id in message_ids {
            let result = match self.process_message(&client, &links, message_id).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "could not create issue");
                    self.deps
                        .notifier
                        .notify(ERROR_TITLE, &format!("Failed to create issue: {}", e));
                    Err(e.to_string())
                }
            };
            let timed_out = matches!(result, Ok(Outcome::TimedOut));
            reports.push(MessageReport {
                message_id: message_id.clone(),
                result,
            });
            if timed_out {
                let skipped = message_ids.len() - reports.len();
                warn!(message_id = %message_id, skipped, "selection timed out, stopping");
                self.deps.notifier.notify(
                    ERROR_TITLE,
                    &format!(
                        "No project was chosen in time. {} remaining message(s) were not processed.",
                        skipped
                    ),
                );
                break;
            }
        }
        reports
    }

    async fn process_message(
        &self,
        client: &JiraClient,
        links: &LinkStore,
        message_id: &str,
    ) -> Result<Outcome> {
        let preferences = &self.settings.preferences;

        let message = self.deps.mail.get_message(message_id).await?;
        let body = self.deps.mail.get_full(message_id).await?;
        let description = extract_with(
            &body,
            &ExtractOptions {
                strip_signatures: preferences.strip_signatures,
            },
        );
        let subject = if message.subject.trim().is_empty() {
            NO_SUBJECT.to_string()
        } else {
            message.subject.trim().to_string()
        };

        let projects = client.get_projects().await?;
        let outcome = self
            .negotiator
            .negotiate(self.deps.ui.as_ref(), client, &subject, projects)
            .await?;
        let selection = match outcome {
            SelectionOutcome::Confirmed(selection) => selection,
            SelectionOutcome::Cancelled => {
                info!(message_id, "user cancelled project selection");
                return Ok(Outcome::Cancelled);
            }
            SelectionOutcome::TimedOut => return Ok(Outcome::TimedOut),
        };

        let request = IssueRequest {
            summary: subject.clone(),
            description,
            project_key: selection.project.key,
            issue_type_id: selection.issue_type.id,
        };
        let issue = client.create_issue(&request).await?;
        let record = links.store(message_id, &issue, None).await?;

        if preferences.show_notifications {
            self.deps.notifier.notify(
                CREATED_TITLE,
                &format!("Issue {} created successfully: {}", issue.key, subject),
            );
        }
        if self.open_created {
            if let Err(e) = self.deps.notifier.open_url(&record.url) {
                warn!(url = %record.url, error = %e, "could not open browser");
            }
        }

        Ok(Outcome::Created(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::fake::{json_response, FakeTransport};
    use crate::api::transport::{HttpRequest, Method};
    use crate::config::settings::{JiraConfig, Preferences};
    use crate::errors::JiraMailError;
    use crate::models::email::{MessagePart, MessageSummary};
    use crate::selection::negotiator::testing::ScriptedUi;
    use crate::storage::kv::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeMail {
        messages: HashMap<String, (String, MessagePart)>,
    }

    impl FakeMail {
        fn with(messages: &[(&str, &str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                messages: messages
                    .iter()
                    .map(|(id, subject, body)| {
                        (
                            id.to_string(),
                            (subject.to_string(), MessagePart::leaf("text/plain", body)),
                        )
                    })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl MailHost for FakeMail {
        async fn get_message(&self, id: &str) -> Result<MessageSummary> {
            let (subject, _) = self
                .messages
                .get(id)
                .ok_or_else(|| JiraMailError::MessageNotFound(id.to_string()))?;
            Ok(MessageSummary {
                id: id.to_string(),
                subject: subject.clone(),
            })
        }

        async fn get_full(&self, id: &str) -> Result<MessagePart> {
            self.messages
                .get(id)
                .map(|(_, body)| body.clone())
                .ok_or_else(|| JiraMailError::MessageNotFound(id.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<(String, String)>>,
        opened: Mutex<Vec<String>>,
        configuration_opened: Mutex<bool>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, message: &str) {
            self.notices
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
        }

        fn open_url(&self, url: &str) -> anyhow::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }

        fn open_configuration(&self) {
            *self.configuration_opened.lock().unwrap() = true;
        }
    }

    fn settings() -> Settings {
        Settings {
            jira: JiraConfig {
                url: "https://x".to_string(),
                username: "me@example.com".to_string(),
                api_token: "token".to_string(),
            },
            preferences: Preferences::default(),
        }
    }

    /// Jira with one project, one usable issue type, and a working v3 create.
    fn jira() -> Arc<FakeTransport> {
        FakeTransport::new(|request: &HttpRequest| {
            let url = request.url.as_str();
            match request.method {
                Method::Get if url.ends_with("/project/search?maxResults=100") => Ok(json_response(
                    200,
                    json!({"values": [{"id": "1", "key": "ENG", "name": "Engineering"}]}),
                )),
                Method::Get if url.ends_with("/project/ENG") => Ok(json_response(
                    200,
                    json!({"issueTypes": [
                        {"id": "10002", "name": "Sub-task", "subtask": true},
                        {"id": "10001", "name": "Task", "subtask": false}
                    ]}),
                )),
                Method::Get => Ok(json_response(200, json!({}))),
                Method::Post if url.ends_with("/rest/api/3/issue") => Ok(json_response(
                    201,
                    json!({"id": "123", "key": "ENG-7", "self": "https://x/rest/api/3/issue/123"}),
                )),
                _ => Ok(json_response(500, json!({"message": "unexpected"}))),
            }
        })
    }

    fn unused_raw() -> Arc<FakeTransport> {
        FakeTransport::new(|_| panic!("raw transport should not be used"))
    }

    struct Harness {
        orchestrator: Orchestrator,
        notifier: Arc<RecordingNotifier>,
        store: Arc<MemoryStore>,
        transport: Arc<FakeTransport>,
    }

    fn harness(settings: Settings, mail: Arc<FakeMail>, ui: Arc<ScriptedUi>) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::new());
        let transport = jira();
        let orchestrator = Orchestrator::new(
            settings,
            Collaborators {
                mail,
                ui,
                notifier: notifier.clone(),
                store: store.clone(),
                transport: transport.clone(),
                raw_transport: unused_raw(),
            },
        );
        Harness {
            orchestrator,
            notifier,
            store,
            transport,
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_creates_issue_and_link() {
        let h = harness(
            settings(),
            FakeMail::with(&[("msg-1", "Printer on fire", "Hello\n--\nJohn Doe")]),
            ScriptedUi::pick_first(),
        );

        let reports = h.orchestrator.run(&ids(&["msg-1"])).await;
        assert_eq!(reports.len(), 1);
        let record = match &reports[0].result {
            Ok(Outcome::Created(record)) => record.clone(),
            other => panic!("unexpected result: {:?}", other),
        };
        assert_eq!(record.key, "ENG-7");
        assert_eq!(record.url, "https://x/browse/ENG-7");

        let links = LinkStore::new(h.store.clone(), "https://x");
        assert_eq!(links.get("msg-1").await.unwrap(), Some(record));

        let post = h
            .transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Post)
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["fields"]["summary"], "Printer on fire");
        assert_eq!(body["fields"]["project"]["key"], "ENG");
        assert_eq!(body["fields"]["issuetype"]["id"], "10001");
        assert_eq!(
            body["fields"]["description"]["content"][0]["content"][0]["text"],
            "Hello"
        );

        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(
            notices.as_slice(),
            [(
                CREATED_TITLE.to_string(),
                "Issue ENG-7 created successfully: Printer on fire".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_routes_to_configuration() {
        let mut unconfigured = settings();
        unconfigured.jira.api_token.clear();
        let h = harness(
            unconfigured,
            FakeMail::with(&[("msg-1", "s", "b")]),
            ScriptedUi::pick_first(),
        );

        let reports = h.orchestrator.run(&ids(&["msg-1"])).await;
        assert!(reports.is_empty());
        assert!(*h.notifier.configuration_opened.lock().unwrap());
        assert_eq!(h.notifier.notices.lock().unwrap()[0].0, TITLE);
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let h = harness(settings(), FakeMail::with(&[]), ScriptedUi::pick_first());
        assert!(h.orchestrator.run(&[]).await.is_empty());
        assert_eq!(
            h.notifier.notices.lock().unwrap()[0].1,
            "No emails selected."
        );
    }

    #[tokio::test]
    async fn test_cancel_is_silent() {
        let h = harness(
            settings(),
            FakeMail::with(&[("msg-1", "s", "b")]),
            ScriptedUi::cancel(),
        );

        let reports = h.orchestrator.run(&ids(&["msg-1"])).await;
        assert_eq!(reports[0].result, Ok(Outcome::Cancelled));
        assert!(h.notifier.notices.lock().unwrap().is_empty());
        assert!(h.store.get("jira_link_msg-1").await.unwrap().is_none());
        assert!(h.transport.requests().iter().all(|r| r.method == Method::Get));
    }

    #[tokio::test]
    async fn test_failure_reported_and_batch_continues() {
        let h = harness(
            settings(),
            FakeMail::with(&[("msg-2", "Second", "Body")]),
            ScriptedUi::pick_first(),
        );

        let reports = h.orchestrator.run(&ids(&["missing", "msg-2"])).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].result,
            Err("Message 'missing' not found".to_string())
        );
        assert!(matches!(reports[1].result, Ok(Outcome::Created(_))));

        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].0, ERROR_TITLE);
        assert_eq!(notices[0].1, "Failed to create issue: Message 'missing' not found");
        assert_eq!(notices[1].0, CREATED_TITLE);
    }

    #[tokio::test]
    async fn test_selection_timeout_stops_the_batch() {
        let mut impatient = settings();
        impatient.preferences.selection_timeout_secs = Some(1);
        let ui = ScriptedUi::new(|handle| async move {
            handle.projects().await.unwrap();
            // Keeps the dialog open well past the timeout.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(handle);
        });
        let h = harness(
            impatient,
            FakeMail::with(&[("msg-1", "First", "a"), ("msg-2", "Second", "b")]),
            ui.clone(),
        );

        let reports = h.orchestrator.run(&ids(&["msg-1", "msg-2"])).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message_id, "msg-1");
        assert_eq!(reports[0].result, Ok(Outcome::TimedOut));
        assert_eq!(ui.subjects.lock().unwrap().as_slice(), ["First"]);

        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, ERROR_TITLE);
        assert!(notices[0].1.contains("1 remaining message(s)"));
    }

    #[tokio::test]
    async fn test_notifications_and_signatures_follow_preferences() {
        let mut quiet = settings();
        quiet.preferences.show_notifications = false;
        quiet.preferences.strip_signatures = false;
        let Harness {
            orchestrator,
            notifier,
            transport,
            ..
        } = harness(
            quiet,
            FakeMail::with(&[("msg-1", "  ", "Hello\n--\nJohn Doe")]),
            ScriptedUi::pick_first(),
        );
        let orchestrator = orchestrator.open_created(true);

        let reports = orchestrator.run(&ids(&["msg-1"])).await;
        assert!(matches!(reports[0].result, Ok(Outcome::Created(_))));
        assert!(notifier.notices.lock().unwrap().is_empty());
        assert_eq!(
            notifier.opened.lock().unwrap().as_slice(),
            ["https://x/browse/ENG-7"]
        );

        let post = transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Post)
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["fields"]["summary"], NO_SUBJECT);
        assert_eq!(
            body["fields"]["description"]["content"][0]["content"][0]["text"],
            "Hello\n--\nJohn Doe"
        );
    }
}
