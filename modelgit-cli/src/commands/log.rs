use super::Workspace;
use crate::display::change_line;
use anyhow::Result;
use colored::Colorize;
use modelgit_core::storage::REMOTE_HEAD;
use modelgit_core::ChangeSetBuilder;
use std::path::PathBuf;

const SHOWN_CHANGES: usize = 5;

pub fn run(workspace: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    let store = workspace.store()?;
    let commits = store.log(limit)?;

    if commits.is_empty() {
        println!("{}", "No commits yet".yellow());
        return Ok(());
    }

    let pushed = store.get_ref(REMOTE_HEAD)?;
    let builder = ChangeSetBuilder::new(&store);

    println!("{}", "Commit History".bold().cyan());
    println!();

    for commit in &commits {
        let marker = if pushed.as_deref() == Some(commit.id.as_str()) {
            format!(" ({})", "origin".green())
        } else {
            String::new()
        };
        println!("{} {}{}", "commit".yellow().bold(), commit.id.yellow(), marker);
        println!("{}: {}", "Author".bold(), commit.author);
        println!(
            "{}: {}",
            "Date".bold(),
            commit.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
        println!("    {}", commit.message);
        println!();

        let changes = builder.between(commit.parent.as_deref(), &commit.id)?;
        println!("    {} model(s) changed", changes.len().to_string().cyan());
        for change in changes.iter().take(SHOWN_CHANGES) {
            println!("      {}", change_line(change));
        }
        if changes.len() > SHOWN_CHANGES {
            println!(
                "      {} and {} more...",
                "...".dimmed(),
                (changes.len() - SHOWN_CHANGES).to_string().dimmed()
            );
        }
        println!();
    }

    if let Some(limit) = limit {
        if commits.len() == limit {
            println!("Use {} to see more", "--limit N".cyan());
        }
    }

    Ok(())
}
