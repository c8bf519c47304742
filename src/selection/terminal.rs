use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use tracing::warn;

use super::negotiator::{DialogHandle, Selection, SelectionUi};
use crate::models::issue::{IssueType, Project};

/// Interactive dialog on the terminal. Runs on a blocking thread and talks
/// to the negotiator through its handle.
pub struct TerminalSelectionUi;

impl SelectionUi for TerminalSelectionUi {
    fn open(&self, subject: &str, handle: DialogHandle) -> anyhow::Result<()> {
        let subject = subject.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = run_dialog(&subject, handle) {
                // The handle is gone by now, which the negotiator reads as a cancel.
                warn!(error = %e, "selection dialog failed");
            }
        });
        Ok(())
    }
}

fn run_dialog(subject: &str, handle: DialogHandle) -> anyhow::Result<()> {
    println!();
    println!("{} {}", "Create Jira issue from:".cyan().bold(), subject.bright_white());
    println!();

    let projects = handle.blocking_projects()?;
    if projects.is_empty() {
        println!("{}", "  No projects available for your account".yellow());
        handle.blocking_cancel()?;
        return Ok(());
    }

    let theme = ColorfulTheme::default();
    loop {
        let filter: String = Input::with_theme(&theme)
            .with_prompt("Filter projects (empty for all)")
            .allow_empty(true)
            .interact_text()?;

        let candidates = filter_projects(&projects, &filter);
        if candidates.is_empty() {
            println!("{}", "  No projects found matching your search".dimmed());
            continue;
        }

        let items: Vec<String> = candidates
            .iter()
            .map(|p| format!("{} [{}]", p.name, p.key))
            .collect();
        let Some(index) = Select::with_theme(&theme)
            .with_prompt("Project (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()?
        else {
            handle.blocking_cancel()?;
            return Ok(());
        };
        let project = candidates[index].clone();

        let issue_types = match handle.blocking_issue_types(&project.key)? {
            Ok(types) => types,
            Err(e) => {
                println!("{}", format!("  Error loading issue types: {}", e).red());
                continue;
            }
        };
        if issue_types.is_empty() {
            println!(
                "{}",
                "  No standard issue types available for this project".dimmed()
            );
            continue;
        }

        let items: Vec<String> = issue_types.iter().map(describe_issue_type).collect();
        let Some(index) = Select::with_theme(&theme)
            .with_prompt("Issue type (Esc to pick another project)")
            .items(&items)
            .default(0)
            .interact_opt()?
        else {
            continue;
        };

        handle.blocking_confirm(Selection {
            project,
            issue_type: issue_types[index].clone(),
        })?;
        return Ok(());
    }
}

/// Case-insensitive match on project name or key.
fn filter_projects<'a>(projects: &'a [Project], filter: &str) -> Vec<&'a Project> {
    let needle = filter.trim().to_lowercase();
    projects
        .iter()
        .filter(|p| {
            needle.is_empty()
                || p.name.to_lowercase().contains(&needle)
                || p.key.to_lowercase().contains(&needle)
        })
        .collect()
}

fn describe_issue_type(issue_type: &IssueType) -> String {
    match issue_type.description.as_deref() {
        Some(description) if !description.trim().is_empty() => {
            format!("{} - {}", issue_type.name, description.trim())
        }
        _ => issue_type.name.clone(),
    }
}
