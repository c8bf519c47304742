use colored::*;
use std::fmt;

use crate::api::strategy::CreationFailure;

#[derive(Debug)]
pub enum JiraMailError {
    // Configuration errors
    ConfigNotFound,
    ConfigInvalid(String),

    // Jira errors
    JiraAuthFailed,
    JiraCsrfRejected,
    JiraAccessDenied,
    JiraEndpointNotFound,
    JiraApiError(u16, String),
    InvalidResponse(String),
    CreationFailed(CreationFailure),
    /// A Jira call that failed while doing `step`, e.g. "fetch projects".
    StepFailed {
        step: String,
        source: Box<JiraMailError>,
    },

    // Mail host errors
    MessageNotFound(String),

    // Network errors
    NetworkError(String),

    // Generic error
    Other(String),
}

impl JiraMailError {
    /// Multi-line, coloured form for the terminal, with a hint on how to fix it.
    pub fn render(&self) -> String {
        let headline = format!("{}", self).red().bold();

        let mut out = headline.to_string();
        if let Some(lines) = self.hints() {
            out.push_str("\n\n   To fix:\n");
            for (i, line) in lines.iter().enumerate() {
                out.push_str(&format!("   {}. {}\n", i + 1, line));
            }
        }
        out
    }

    /// Wrap with the step that was being attempted.
    pub fn during(self, step: impl Into<String>) -> Self {
        JiraMailError::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }

    fn hints(&self) -> Option<Vec<String>> {
        match self {
            JiraMailError::ConfigNotFound => Some(vec![
                format!("Run {} to set up your credentials", "jiramail init".green()),
            ]),
            JiraMailError::ConfigInvalid(_) => Some(vec![
                "Check your config file: ~/.jiramail/config.toml".to_string(),
                format!("Or reinitialize: {}", "jiramail init".green()),
            ]),
            JiraMailError::JiraAuthFailed => Some(vec![
                format!(
                    "Generate new token: {}",
                    "https://id.atlassian.com/manage-profile/security/api-tokens".cyan()
                ),
                format!("Update config: {}", "jiramail config set jira.token <token>".green()),
            ]),
            JiraMailError::JiraCsrfRejected | JiraMailError::JiraAccessDenied => Some(vec![
                "Verify your account can create issues in this project".to_string(),
                "Ask your Jira administrator about API access for your account".to_string(),
            ]),
            JiraMailError::JiraEndpointNotFound => Some(vec![
                "Check the Jira base URL, e.g. https://company.atlassian.net".to_string(),
                format!("Update config: {}", "jiramail config set jira.url <url>".green()),
            ]),
            JiraMailError::CreationFailed(failure) => Some(
                failure
                    .attempts()
                    .iter()
                    .map(|(strategy, err)| format!("{} attempt: {}", strategy, err))
                    .collect(),
            ),
            JiraMailError::JiraApiError(status, _) if *status >= 500 => Some(vec![format!(
                "Jira answered HTTP {}; the server may be struggling, try again shortly",
                status
            )]),
            JiraMailError::JiraApiError(400, _) => Some(vec![
                "Check that the project accepts this issue type and its required fields".to_string(),
            ]),
            JiraMailError::NetworkError(_) => Some(vec![
                "Check your internet connection".to_string(),
                "Verify you can reach the Jira URL from this machine".to_string(),
                format!("Test the connection: {}", "jiramail test".green()),
            ]),
            JiraMailError::StepFailed { source, .. } => source.hints(),
            _ => None,
        }
    }
}

impl fmt::Display for JiraMailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration errors
            JiraMailError::ConfigNotFound => {
                write!(f, "Jira not configured. Please check your settings.")
            }
            JiraMailError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),

            // Jira errors
            JiraMailError::JiraAuthFailed => write!(
                f,
                "Authentication failed: Please check your email and API token."
            ),
            JiraMailError::JiraCsrfRejected => write!(
                f,
                "CSRF protection error: This may be due to Jira security settings. Contact your administrator."
            ),
            JiraMailError::JiraAccessDenied => write!(
                f,
                "Access denied: Your account may not have permission to access Jira API."
            ),
            JiraMailError::JiraEndpointNotFound => write!(
                f,
                "API endpoint not found: Please verify your Jira URL is correct."
            ),
            JiraMailError::JiraApiError(_, msg) => write!(f, "{}", msg),
            JiraMailError::InvalidResponse(msg) => {
                write!(f, "Unexpected response from Jira: {}", msg)
            }
            JiraMailError::CreationFailed(failure) => write!(f, "{}", failure),
            JiraMailError::StepFailed { step, source } => write!(f, "Failed to {}: {}", step, source),

            JiraMailError::MessageNotFound(id) => write!(f, "Message '{}' not found", id),

            // Network errors
            JiraMailError::NetworkError(msg) => write!(
                f,
                "Network error: Unable to connect to Jira ({}). This may be due to CORS policy, network issues, or an invalid URL.",
                msg
            ),

            // Generic
            JiraMailError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for JiraMailError {}

// Conversion from anyhow::Error
impl From<anyhow::Error> for JiraMailError {
    fn from(err: anyhow::Error) -> Self {
        JiraMailError::Other(err.to_string())
    }
}

impl From<std::io::Error> for JiraMailError {
    fn from(err: std::io::Error) -> Self {
        JiraMailError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for JiraMailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            JiraMailError::ConfigInvalid(err.to_string())
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            JiraMailError::NetworkError(err.to_string())
        } else {
            JiraMailError::Other(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, JiraMailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_single_line() {
        let err = JiraMailError::JiraAuthFailed;
        assert!(!err.to_string().contains('\n'));
        assert!(err.to_string().starts_with("Authentication failed"));
    }

    #[test]
    fn test_render_includes_hints() {
        colored::control::set_override(false);
        let rendered = JiraMailError::JiraEndpointNotFound.render();
        assert!(rendered.contains("To fix:"));
        assert!(rendered.contains("1. Check the Jira base URL"));
    }

    #[test]
    fn test_render_without_hint() {
        colored::control::set_override(false);
        let rendered = JiraMailError::Other("boom".to_string()).render();
        assert_eq!(rendered, "boom");
    }

    #[test]
    fn test_step_failure_keeps_source_hints() {
        colored::control::set_override(false);
        let err = JiraMailError::JiraAuthFailed.during("fetch projects");
        assert_eq!(
            err.to_string(),
            "Failed to fetch projects: Authentication failed: Please check your email and API token."
        );
        assert!(err.render().contains("Generate new token"));
    }

    #[test]
    fn test_server_error_hint_names_status() {
        colored::control::set_override(false);
        let err = JiraMailError::JiraApiError(503, "HTTP 503: Service Unavailable".to_string());
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
        assert!(err.render().contains("Jira answered HTTP 503"));
        assert!(JiraMailError::JiraApiError(400, "bad".to_string())
            .render()
            .contains("required fields"));
    }

    #[test]
    fn test_network_error_mentions_connectivity() {
        let err = JiraMailError::NetworkError("connection refused".to_string());
        let msg = err.to_string();
        assert!(msg.starts_with("Network error"));
        assert!(msg.contains("connection refused"));
    }
}
