use super::{committed_entity, Workspace};
use crate::display::{diff_label, print_diff};
use anyhow::Result;
use colored::Colorize;
use modelgit_core::{DiffType, ModelDiff, ModelType};
use std::path::PathBuf;

pub fn run(workspace: Option<PathBuf>, target: Option<(ModelType, String)>) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    let changes: Vec<_> = workspace
        .orchestrator()?
        .workspace_changes()?
        .into_iter()
        .filter(|c| match &target {
            Some((model_type, ref_id)) => c.model_type == *model_type && &c.ref_id == ref_id,
            None => true,
        })
        .collect();

    if changes.is_empty() {
        println!("{}", "No uncommitted changes".green());
        return Ok(());
    }

    let store = workspace.store()?;
    let db = workspace.db()?;
    let head = store.head()?;

    for change in changes {
        println!("{}", "━".repeat(80).bright_black());
        println!(
            "{} {} {}",
            diff_label(change.diff_type),
            change.model_type.to_string().dimmed(),
            change.path.white().bold()
        );
        println!();

        let before = match change.diff_type {
            DiffType::Added => None,
            _ => committed_entity(&store, head.as_deref(), change.model_type, &change.ref_id)?,
        };
        let after = match change.diff_type {
            DiffType::Deleted => None,
            _ => db.get(change.model_type, &change.ref_id)?,
        };

        let diff = ModelDiff::between(&change.path, before.as_ref(), after.as_ref())?;
        print_diff(&diff);
        println!();
    }

    Ok(())
}
