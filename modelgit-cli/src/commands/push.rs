use super::Workspace;
use crate::display::wait_for;
use anyhow::Result;
use colored::Colorize;
use modelgit_core::{job, CommitResult, PushStatus};
use std::path::PathBuf;
use std::sync::Arc;

pub fn run(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    if workspace.config.remote.is_none() {
        anyhow::bail!("No remote configured. Run 'modelgit init --remote <url> --repository <group/name>'.");
    }

    let orchestrator = Arc::new(workspace.orchestrator()?);
    let handle = job::spawn("push", move |ctx| orchestrator.push(ctx))?;
    let result = wait_for("Pushing", handle)?;
    print_result(&result);
    Ok(())
}

pub fn print_result(result: &CommitResult) {
    match result.status {
        PushStatus::Ok if result.new_commits.is_empty() => {
            println!("{}", "Everything up to date".green());
        }
        PushStatus::Ok => {
            println!(
                "{}",
                format!("✓ Pushed {} commit(s)", result.new_commits.len())
                    .green()
                    .bold()
            );
            for commit in result.most_recent_first() {
                println!("  {} {}", commit.short_id().yellow(), commit.message);
            }
        }
        PushStatus::RejectedNonFastForward => {
            println!(
                "{}",
                "✗ Push rejected: the remote has commits you do not have"
                    .red()
                    .bold()
            );
        }
        PushStatus::RejectedOtherReason => {
            println!("{}", "✗ Push rejected by the remote".red().bold());
        }
    }
}
