use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "JIRAMAIL";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "email")]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub show_notifications: bool,
    #[serde(default = "default_true")]
    pub strip_signatures: bool,
    /// Give up on an unanswered selection dialog after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_timeout_secs: Option<u64>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            show_notifications: true,
            strip_signatures: true,
            selection_timeout_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Config file (if any) overlaid with `JIRAMAIL_*` environment variables,
    /// e.g. `JIRAMAIL_JIRA__API_TOKEN`.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(path, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(path: &Path, env: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(env)
            .build()
            .context("Failed to read config file")?
            .try_deserialize::<Settings>()
            .context("Failed to parse config file")?;

        Ok(settings)
    }

    /// Base URL, username and token are all present.
    pub fn is_configured(&self) -> bool {
        !self.jira.url.trim().is_empty()
            && !self.jira.username.trim().is_empty()
            && !self.jira.api_token.trim().is_empty()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let config_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, config_str).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(config_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(config_path, perms)?;
        }

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn links_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("links.json"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".jiramail"))
    }
}
