use colored::*;
use tracing::debug;

use crate::config::settings::Settings;

/// User-facing side effects.
pub trait Notifier: Send + Sync {
    /// Fire and forget.
    fn notify(&self, title: &str, message: &str);

    fn open_url(&self, url: &str) -> anyhow::Result<()>;

    /// Send the user to wherever the settings live.
    fn open_configuration(&self);
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        let title = if title.contains("Error") {
            title.red().bold()
        } else {
            title.green().bold()
        };
        println!("{}", title);
        println!("  {}", message);
    }

    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        debug!(url, "opening browser");
        println!("{} {}", "Opening:".dimmed(), url.bright_white());
        open::that(url)?;
        Ok(())
    }

    fn open_configuration(&self) {
        println!();
        println!("   To configure:");
        println!("   1. Run {}", "jiramail init".green());
        match Settings::config_path() {
            Ok(path) => println!("   2. Or edit {}", path.display().to_string().bright_white()),
            Err(_) => println!("   2. Or set JIRAMAIL_JIRA__URL, JIRAMAIL_JIRA__USERNAME and JIRAMAIL_JIRA__API_TOKEN"),
        }
    }
}
