//! Project / issue-type selection round-trip.
//!
//! The negotiator opens a dialog through a [`SelectionUi`] and serves its
//! requests over a channel that belongs to one session. The dialog asks
//! for the project list, asks for issue types as the user moves between
//! projects, and finally confirms or cancels. A dialog that disappears
//! without answering (its [`DialogHandle`] dropped) counts as a cancel.
//!
//! The receiving end of the channel lives in a [`Session`] guard. Dropping
//! the guard closes the channel, so whatever way `negotiate` returns, a
//! dialog still holding its handle sees [`SessionClosed`] on its next
//! request rather than waiting forever.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::issue::{IssueType, Project};

const CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub project: Project,
    pub issue_type: IssueType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Confirmed(Selection),
    Cancelled,
    /// Nobody answered within the configured timeout. The dialog may still
    /// be on screen, so callers should not open another one on the same
    /// surface.
    TimedOut,
}

#[derive(Debug)]
pub enum DialogRequest {
    GetData,
    GetProjectIssueTypes { project_key: String },
    Confirm(Selection),
    Cancel,
}

#[derive(Debug)]
pub enum DialogReply {
    Projects(Vec<Project>),
    IssueTypes(std::result::Result<Vec<IssueType>, String>),
    Closed,
}

struct Envelope {
    session: SessionId,
    request: DialogRequest,
    reply: oneshot::Sender<DialogReply>,
}

/// The negotiator is no longer listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "selection session closed")
    }
}

impl std::error::Error for SessionClosed {}

/// The dialog's end of a session.
pub struct DialogHandle {
    session: SessionId,
    tx: mpsc::Sender<Envelope>,
}

impl DialogHandle {
    #[cfg(test)]
    async fn request(&self, request: DialogRequest) -> std::result::Result<DialogReply, SessionClosed> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(Envelope {
                session: self.session,
                request,
                reply,
            })
            .await
            .map_err(|_| SessionClosed)?;
        answer.await.map_err(|_| SessionClosed)
    }

    /// For dialogs running on a blocking thread. Panics inside an async context.
    fn blocking_request(&self, request: DialogRequest) -> std::result::Result<DialogReply, SessionClosed> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .blocking_send(Envelope {
                session: self.session,
                request,
                reply,
            })
            .map_err(|_| SessionClosed)?;
        answer.blocking_recv().map_err(|_| SessionClosed)
    }

    #[cfg(test)]
    pub async fn projects(&self) -> std::result::Result<Vec<Project>, SessionClosed> {
        expect_projects(self.request(DialogRequest::GetData).await?)
    }

    #[cfg(test)]
    pub async fn issue_types(
        &self,
        project_key: &str,
    ) -> std::result::Result<std::result::Result<Vec<IssueType>, String>, SessionClosed> {
        expect_issue_types(
            self.request(DialogRequest::GetProjectIssueTypes {
                project_key: project_key.to_string(),
            })
            .await?,
        )
    }

    #[cfg(test)]
    pub async fn confirm(self, selection: Selection) -> std::result::Result<(), SessionClosed> {
        self.request(DialogRequest::Confirm(selection)).await.map(|_| ())
    }

    #[cfg(test)]
    pub async fn cancel(self) -> std::result::Result<(), SessionClosed> {
        self.request(DialogRequest::Cancel).await.map(|_| ())
    }

    pub fn blocking_projects(&self) -> std::result::Result<Vec<Project>, SessionClosed> {
        expect_projects(self.blocking_request(DialogRequest::GetData)?)
    }

    pub fn blocking_issue_types(
        &self,
        project_key: &str,
    ) -> std::result::Result<std::result::Result<Vec<IssueType>, String>, SessionClosed> {
        expect_issue_types(self.blocking_request(DialogRequest::GetProjectIssueTypes {
            project_key: project_key.to_string(),
        })?)
    }

    pub fn blocking_confirm(self, selection: Selection) -> std::result::Result<(), SessionClosed> {
        self.blocking_request(DialogRequest::Confirm(selection)).map(|_| ())
    }

    pub fn blocking_cancel(self) -> std::result::Result<(), SessionClosed> {
        self.blocking_request(DialogRequest::Cancel).map(|_| ())
    }
}

fn expect_projects(reply: DialogReply) -> std::result::Result<Vec<Project>, SessionClosed> {
    match reply {
        DialogReply::Projects(projects) => Ok(projects),
        _ => Err(SessionClosed),
    }
}

fn expect_issue_types(
    reply: DialogReply,
) -> std::result::Result<std::result::Result<Vec<IssueType>, String>, SessionClosed> {
    match reply {
        DialogReply::IssueTypes(result) => Ok(result),
        _ => Err(SessionClosed),
    }
}

/// Something that can show a selection dialog.
pub trait SelectionUi: Send + Sync {
    /// Show the dialog and return immediately. The dialog reports back
    /// through `handle`.
    fn open(&self, subject: &str, handle: DialogHandle) -> anyhow::Result<()>;
}

#[async_trait]
pub trait IssueTypeSource: Send + Sync {
    async fn project_issue_types(&self, project_key: &str) -> Result<Vec<IssueType>>;
}

/// Negotiator's end of a session. Closes the channel when dropped.
struct Session {
    id: SessionId,
    rx: mpsc::Receiver<Envelope>,
}

impl Session {
    async fn serve(&mut self, source: &dyn IssueTypeSource, projects: &[Project]) -> SelectionOutcome {
        while let Some(envelope) = self.rx.recv().await {
            if envelope.session != self.id {
                warn!(expected = %self.id, got = %envelope.session, "ignoring message for another selection session");
                continue;
            }

            match envelope.request {
                DialogRequest::GetData => {
                    let _ = envelope.reply.send(DialogReply::Projects(projects.to_vec()));
                }
                DialogRequest::GetProjectIssueTypes { project_key } => {
                    let result: std::result::Result<Vec<IssueType>, String> = source
                        .project_issue_types(&project_key)
                        .await
                        .map(|types| types.into_iter().filter(|t| !t.subtask).collect())
                        .map_err(|e| e.to_string());
                    if let Err(e) = &result {
                        debug!(project = %project_key, error = %e, "issue types unavailable");
                    }
                    let _ = envelope.reply.send(DialogReply::IssueTypes(result));
                }
                DialogRequest::Confirm(selection) => {
                    let _ = envelope.reply.send(DialogReply::Closed);
                    return SelectionOutcome::Confirmed(selection);
                }
                DialogRequest::Cancel => {
                    let _ = envelope.reply.send(DialogReply::Closed);
                    return SelectionOutcome::Cancelled;
                }
            }
        }

        debug!(session = %self.id, "selection dialog closed without an answer");
        SelectionOutcome::Cancelled
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.rx.close();
        debug!(session = %self.id, "selection session torn down");
    }
}

pub struct SelectionNegotiator {
    timeout: Option<Duration>,
}

impl SelectionNegotiator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn negotiate(
        &self,
        ui: &dyn SelectionUi,
        source: &dyn IssueTypeSource,
        subject: &str,
        projects: Vec<Project>,
    ) -> Result<SelectionOutcome> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut session = Session {
            id: SessionId::new(),
            rx,
        };
        debug!(session = %session.id, "opening selection dialog");

        ui.open(
            subject,
            DialogHandle {
                session: session.id,
                tx,
            },
        )?;

        let serve = session.serve(source, &projects);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, serve).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(seconds = limit.as_secs(), "selection dialog timed out");
                    SelectionOutcome::TimedOut
                }
            },
            None => serve.await,
        };

        Ok(outcome)
    }
}
