use super::Workspace;
use crate::display::change_line;
use anyhow::Result;
use colored::Colorize;
use modelgit_core::storage::REMOTE_HEAD;
use std::path::PathBuf;

const SHOWN_CHANGES: usize = 20;

pub fn run(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    let orchestrator = workspace.orchestrator()?;
    let changes = orchestrator.workspace_changes()?;

    let (head, tracking) = {
        let store = workspace.store()?;
        (store.head()?, store.get_ref(REMOTE_HEAD)?)
    };

    println!("{}", "Workspace Status".bold().cyan());
    println!(
        "  {}: {}",
        "HEAD".bold(),
        head.as_deref().map(short).unwrap_or("(no commits)")
    );
    match (&workspace.config.remote, tracking) {
        (Some(remote), Some(pushed)) if Some(&pushed) == head.as_ref() => {
            println!("  {}: {} (up to date)", "Remote".bold(), remote.url)
        }
        (Some(remote), Some(pushed)) => println!(
            "  {}: {} (last pushed {})",
            "Remote".bold(),
            remote.url,
            short(&pushed)
        ),
        (Some(remote), None) => println!("  {}: {} (never pushed)", "Remote".bold(), remote.url),
        (None, _) => {}
    }
    println!();

    if changes.is_empty() {
        println!("{}", "No uncommitted changes".green());
        return Ok(());
    }

    println!(
        "{} {}",
        "Uncommitted changes:".bold(),
        format!("({})", changes.len()).yellow()
    );
    println!();
    for change in changes.iter().take(SHOWN_CHANGES) {
        println!("  {}", change_line(change));
    }
    if changes.len() > SHOWN_CHANGES {
        println!();
        println!(
            "  {} and {} more...",
            "...".dimmed(),
            (changes.len() - SHOWN_CHANGES).to_string().yellow()
        );
    }

    println!();
    println!(
        "Run {} to commit these changes",
        "modelgit commit -m \"message\"".cyan()
    );
    Ok(())
}

fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}
