use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod config;
mod errors;
mod mail;
mod models;
mod notify;
mod orchestrator;
mod selection;
mod storage;

use api::jira::{ConnectionTest, Credentials, JiraClient};
use crate::config::settings::Settings;
use errors::JiraMailError;

#[derive(Parser)]
#[command(name = "jiramail")]
#[command(version)]
#[command(about = "Turn emails into Jira issues", long_about = None)]
struct Cli {
    /// for debugging purposes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up Jira credentials
    Init,

    /// Create a Jira issue from each selected email
    Send {
        /// Message ids (file names without .json in the mailbox)
        ids: Vec<String>,

        /// Directory holding exported messages
        #[arg(long, short, default_value = ".")]
        mailbox: PathBuf,

        /// Process every message in the mailbox
        #[arg(long)]
        all: bool,

        /// Open each created issue in the browser
        #[arg(long)]
        open: bool,
    },

    /// Show the issue created from an email
    Link {
        id: String,

        /// Open the issue in the browser
        #[arg(long)]
        open: bool,
    },

    /// List Jira projects visible to you
    Projects,

    /// Test the Jira connection
    Test,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display current configuration (with masked secrets)
    Show,

    /// Set a specific configuration value
    Set {
        /// Configuration key (e.g., jira.url, jira.username, preferences.strip_signatures)
        key: String,
        /// New value
        value: String,
    },

    /// Validate configuration by testing the Jira connection
    Validate,

    /// Get the path to the config file
    Path,
}

/// How long to wait for blocking work (a terminal prompt the selection
/// timeout walked away from) before exiting anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    println!("{}", format!("jiramail v{}", env!("CARGO_PKG_VERSION")).bright_cyan().bold());
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Failed to start async runtime: {}", e).red().bold());
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(cli.command));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    if let Err(e) = result {
        match e.downcast_ref::<JiraMailError>() {
            Some(err) => eprintln!("\n{}", err.render()),
            None => eprintln!("\n{}", format!("{:#}", e).red().bold()),
        }
        std::process::exit(1);
    }

    println!();
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => handle_init().await,

        Commands::Send {
            ids,
            mailbox,
            all,
            open,
        } => handle_send(ids, mailbox, all, open).await,

        Commands::Link { id, open } => handle_link(&id, open).await,

        Commands::Projects => handle_projects().await,

        Commands::Test => handle_test().await,

        Commands::Config { action } => handle_config(action).await,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("jiramail=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn jira_client(settings: &Settings) -> anyhow::Result<JiraClient> {
    let credentials = Credentials::from_settings(settings).ok_or(JiraMailError::ConfigNotFound)?;
    Ok(JiraClient::native(credentials)?)
}

async fn handle_send(
    ids: Vec<String>,
    mailbox: PathBuf,
    all: bool,
    open: bool,
) -> anyhow::Result<()> {
    use api::transport::{FetchTransport, RawTransport};
    use mail::host::JsonMailbox;
    use orchestrator::{Collaborators, Orchestrator, Outcome};
    use storage::kv::JsonFileStore;

    let settings = Settings::load()?;
    let mailbox = Arc::new(JsonMailbox::new(mailbox));

    let ids = if all { mailbox.list_ids().await? } else { ids };

    let orchestrator = Orchestrator::new(
        settings,
        Collaborators {
            mail: mailbox,
            ui: Arc::new(selection::terminal::TerminalSelectionUi),
            notifier: Arc::new(notify::ConsoleNotifier),
            store: Arc::new(JsonFileStore::new(Settings::links_path()?)),
            transport: Arc::new(FetchTransport::new()),
            raw_transport: Arc::new(RawTransport::new()?),
        },
    )
    .open_created(open);

    let reports = orchestrator.run(&ids).await;
    if reports.is_empty() {
        return Ok(());
    }

    let created = reports
        .iter()
        .filter(|r| matches!(r.result, Ok(Outcome::Created(_))))
        .count();
    let cancelled = reports
        .iter()
        .filter(|r| matches!(r.result, Ok(Outcome::Cancelled | Outcome::TimedOut)))
        .count();
    let failed = reports.len() - created - cancelled;

    println!();
    for report in &reports {
        let status = match &report.result {
            Ok(Outcome::Created(record)) => format!("{} {}", "✓".green(), record.key),
            Ok(Outcome::Cancelled) => "skipped".dimmed().to_string(),
            Ok(Outcome::TimedOut) => "timed out".yellow().to_string(),
            Err(e) => format!("{} {}", "✗".red(), e),
        };
        println!("  {}  {}", report.message_id.bright_white(), status);
    }
    let unprocessed = ids.len() - reports.len();
    if unprocessed > 0 {
        println!(
            "{}",
            format!("  {} message(s) not processed", unprocessed).yellow()
        );
    }
    println!(
        "  {} created, {} skipped, {} failed",
        created.to_string().green().bold(),
        cancelled.to_string().dimmed(),
        failed.to_string().red()
    );

    if failed > 0 {
        anyhow::bail!("{} of {} messages failed", failed, reports.len());
    }
    Ok(())
}

async fn handle_link(id: &str, open: bool) -> anyhow::Result<()> {
    use storage::kv::JsonFileStore;
    use storage::links::LinkStore;

    let settings = Settings::load()?;
    let links = LinkStore::new(
        Arc::new(JsonFileStore::new(Settings::links_path()?)),
        &settings.jira.url,
    );

    match links.get(id).await? {
        Some(record) => {
            println!("  {} {}", "Issue:".bold(), record.key.bright_white());
            println!("  {} {}", "URL:".bold(), record.url.bright_cyan());
            println!(
                "  {} {}",
                "Created:".bold(),
                record.created_at.to_rfc3339().dimmed()
            );
            if open {
                open::that(&record.url)?;
            }
        }
        None => {
            println!("{}", format!("  No issue linked to message '{}'", id).dimmed());
        }
    }

    Ok(())
}

async fn handle_projects() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let jira = jira_client(&settings)?;

    let projects = jira.get_projects().await?;
    if projects.is_empty() {
        println!("{}", "  No projects visible to your account".dimmed());
        return Ok(());
    }

    println!("{}", "Jira Projects".cyan().bold());
    println!();
    for project in projects {
        println!("  {}  {}", project.key.bright_white().bold(), project.name);
    }

    Ok(())
}

async fn handle_test() -> anyhow::Result<()> {
    println!("{}", "Testing Jira API connection...".cyan());
    println!();

    let settings = Settings::load()?;
    let jira = jira_client(&settings)?;

    match jira.test_connection().await {
        ConnectionTest::Success(user) => {
            println!("{}", "✓ Connected to Jira!".green().bold());
            println!();
            println!("  {} {}", "User:".bold(), user.display_name.bright_white());
            if let Some(email) = &user.email_address {
                println!("  {} {}", "Email:".bold(), email.bright_white());
            }
            Ok(())
        }
        ConnectionTest::Failure(e) => {
            anyhow::bail!("Jira connection failed: {}", e)
        }
    }
}

async fn handle_init() -> anyhow::Result<()> {
    use crate::config::settings::*;

    println!("{}", "jiramail Configuration Setup".cyan().bold());
    println!();
    println!(
        "{}",
        "This will store your credentials in ~/.jiramail/config.toml".dimmed()
    );
    println!(
        "{}",
        "The file will be created with read-only permissions (600)".dimmed()
    );
    println!();

    println!("{}", "Jira Configuration".bold());
    let jira_url = prompt("Jira URL (e.g., https://company.atlassian.net)")?;
    let username = prompt("Jira email or username")?;
    println!();
    println!("{}", "To create a Jira API token:".dimmed());
    println!(
        "{}",
        "  1. Go to https://id.atlassian.com/manage-profile/security/api-tokens".dimmed()
    );
    println!("{}", "  2. Click 'Create API token'".dimmed());
    println!("{}", "  3. Copy and paste it here".dimmed());
    println!();
    let api_token = prompt_password("Jira API token")?;

    println!();
    println!("{}", "=== Preferences ===".bold());
    let show_notifications = prompt_with_default("Show notifications (y/n)", "y")?;
    let strip_signatures = prompt_with_default("Strip email signatures (y/n)", "y")?;

    let settings = Settings {
        jira: JiraConfig {
            url: jira_url,
            username,
            api_token,
        },
        preferences: Preferences {
            show_notifications: parse_bool(&show_notifications)?,
            strip_signatures: parse_bool(&strip_signatures)?,
            selection_timeout_secs: None,
        },
    };

    println!();
    println!("{}", "Validating configuration...".cyan());
    println!();

    print!("{}", "  Testing Jira connection... ".dimmed());
    std::io::Write::flush(&mut std::io::stdout())?;
    let jira = jira_client(&settings)?;

    match jira.test_connection().await {
        ConnectionTest::Success(user) => {
            println!("{} {}", "✓".green().bold(), user.display_name.dimmed());
        }
        ConnectionTest::Failure(e) => {
            println!("{}", "✗".red().bold());
            return Err(JiraMailError::ConfigInvalid(format!("Jira connection failed: {}", e)).into());
        }
    }

    settings.save()?;

    let config_path = Settings::config_path()?;
    println!();
    println!("{}", "Configuration saved!".green().bold());
    println!(
        "  Location: {}",
        config_path.display().to_string().bright_white()
    );
    println!();
    println!("{}", "Keep your API token secure!".yellow());

    Ok(())
}

fn prompt(message: &str) -> anyhow::Result<String> {
    use std::io::Write;
    print!("{}: ", message.bright_white());
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password(message: &str) -> anyhow::Result<String> {
    let token = dialoguer::Password::new()
        .with_prompt(message)
        .interact()?;
    Ok(token.trim().to_string())
}

fn prompt_with_default(message: &str, default: &str) -> anyhow::Result<String> {
    use std::io::Write;
    print!("{} [{}]: ", message.bright_white(), default.dimmed());
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "on" => Ok(true),
        "n" | "no" | "false" | "0" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("Expected yes or no, got '{}'", other)),
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(3));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

fn apply_config_value(settings: &mut Settings, key: &str, value: &str) -> anyhow::Result<()> {
    // Parse the key to determine what to set
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!(
            "Invalid key format. Use format: section.field (e.g., jira.url)"
        ));
    }

    match (parts[0], parts[1]) {
        ("jira", "url") => settings.jira.url = value.to_string(),
        ("jira", "username") | ("jira", "email") => settings.jira.username = value.to_string(),
        ("jira", "token") | ("jira", "api_token") => settings.jira.api_token = value.to_string(),
        ("preferences", "show_notifications") => {
            settings.preferences.show_notifications = parse_bool(value)?
        }
        ("preferences", "strip_signatures") => {
            settings.preferences.strip_signatures = parse_bool(value)?
        }
        ("preferences", "selection_timeout_secs") => {
            settings.preferences.selection_timeout_secs = match value.trim() {
                "" | "none" | "0" => None,
                secs => Some(
                    secs.parse()
                        .map_err(|_| anyhow::anyhow!("Expected a number of seconds, got '{}'", secs))?,
                ),
            }
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

async fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings::load()?;

            println!("{}", "Current Configuration".cyan().bold());
            println!();

            println!("{}", "[jira]".bold());
            println!("  {} {}", "url:".dimmed(), settings.jira.url.bright_white());
            println!(
                "  {} {}",
                "username:".dimmed(),
                settings.jira.username.bright_white()
            );
            println!(
                "  {} {}",
                "api_token:".dimmed(),
                mask_secret(&settings.jira.api_token).yellow()
            );

            println!();
            println!("{}", "[preferences]".bold());
            println!(
                "  {} {}",
                "show_notifications:".dimmed(),
                settings.preferences.show_notifications.to_string().bright_white()
            );
            println!(
                "  {} {}",
                "strip_signatures:".dimmed(),
                settings.preferences.strip_signatures.to_string().bright_white()
            );
            let timeout = settings
                .preferences
                .selection_timeout_secs
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "none".to_string());
            println!(
                "  {} {}",
                "selection_timeout_secs:".dimmed(),
                timeout.bright_white()
            );

            if !settings.is_configured() {
                println!();
                println!(
                    "{}",
                    "  Not configured yet. Run 'jiramail init'.".yellow()
                );
            }

            Ok(())
        }

        ConfigAction::Set { key, value } => {
            let mut settings = Settings::load()?;
            apply_config_value(&mut settings, &key, &value)?;
            settings.save()?;

            let shown = if key.ends_with("token") {
                mask_secret(&value)
            } else {
                value.clone()
            };
            println!("{}", format!("✓ Updated {} to: {}", key, shown).green().bold());
            println!();
            println!("{}", "Configuration saved successfully!".green());

            Ok(())
        }

        ConfigAction::Validate => {
            println!("{}", "Validating configuration...".cyan().bold());
            println!();

            let settings = Settings::load()?;

            print!("{}", "  Testing Jira connection... ".dimmed());
            std::io::Write::flush(&mut std::io::stdout())?;

            let jira = jira_client(&settings)?;
            match jira.test_connection().await {
                ConnectionTest::Success(_) => {
                    println!("{}", "✓".green().bold());
                }
                ConnectionTest::Failure(e) => {
                    println!("{}", "✗".red().bold());
                    println!();
                    println!("{}", format!("  Jira connection failed: {}", e).red());
                    println!();
                    println!("{}", "  To fix:".yellow());
                    println!("{}", "    1. Check your Jira URL is correct".dimmed());
                    println!("{}", "    2. Verify your API token is valid".dimmed());
                    println!(
                        "{}",
                        "    3. Update with: jiramail config set jira.token <new-token>".dimmed()
                    );
                    return Err(anyhow::anyhow!("Jira validation failed"));
                }
            }

            println!();
            println!("{}", "✓ All validations passed!".green().bold());

            Ok(())
        }

        ConfigAction::Path => {
            let config_path = Settings::config_path()?;
            println!("{}", config_path.display());
            Ok(())
        }
    }
}
