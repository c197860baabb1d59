use super::push::print_result;
use super::Workspace;
use crate::display::{change_line, print_restrictions, print_tree};
use anyhow::Result;
use colored::Colorize;
use dialoguer::{Confirm, Input, MultiSelect};
use modelgit_core::orchestrator::{ReviewDecision, SkipReason};
use modelgit_core::{
    job, DiffTree, FlowOutcome, LibraryRestriction, ModelType, PushOutcome, Reviewer,
    SelectionModel, SelectionSpec,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub struct CommitOptions {
    pub message: Option<String>,
    pub select: Vec<(ModelType, String)>,
    pub interactive: bool,
    pub push: bool,
    pub skip_library_check: bool,
    pub confirm_restrictions: bool,
    pub lock_new_elements: bool,
}

impl CommitOptions {
    fn selection_spec(&self) -> SelectionSpec {
        if self.select.is_empty() {
            SelectionSpec::All
        } else {
            SelectionSpec::Explicit(self.select.iter().cloned().collect())
        }
    }
}

/// Takes the review decisions from the command line flags, prompting for
/// the rest in interactive mode.
struct PromptReviewer {
    options: CommitOptions,
    has_remote: bool,
}

impl PromptReviewer {
    fn decide(&self, tree: &DiffTree) -> Result<Option<ReviewDecision>> {
        let options = &self.options;
        let mut selection = SelectionModel::new(tree, options.lock_new_elements);
        selection.initialize(&options.selection_spec());

        if options.interactive {
            let nodes: Vec<_> = tree
                .model_nodes()
                .into_iter()
                .filter(|id| tree.get(*id).has_changed())
                .collect();
            let items: Vec<String> = nodes
                .iter()
                .filter_map(|id| tree.get(*id).diff_result())
                .map(|r| change_line(&r.change))
                .collect();
            let defaults: Vec<bool> = nodes.iter().map(|id| selection.is_selected(*id)).collect();

            let Some(chosen) = MultiSelect::new()
                .with_prompt("Select changes to commit")
                .items(&items)
                .defaults(&defaults)
                .interact_opt()?
            else {
                return Ok(None);
            };
            for (index, id) in nodes.iter().enumerate() {
                selection.toggle(*id, chosen.contains(&index));
            }
        }

        println!("{}", "Changes to commit:".bold());
        print_tree(tree, |id| selection.is_selected(id));
        println!();

        let selected = selection.selected_changes();
        if selected.is_empty() {
            return Ok(Some(ReviewDecision {
                selected,
                message: String::new(),
                push: false,
                skip_library_check: options.skip_library_check,
            }));
        }

        let message = match &options.message {
            Some(message) => message.clone(),
            None => Input::<String>::new()
                .with_prompt("Commit message")
                .interact_text()?,
        };
        let push = options.push
            || (options.interactive
                && self.has_remote
                && Confirm::new()
                    .with_prompt("Push after commit?")
                    .default(false)
                    .interact()?);

        Ok(Some(ReviewDecision {
            selected,
            message,
            push,
            skip_library_check: options.skip_library_check,
        }))
    }
}

impl Reviewer for PromptReviewer {
    fn review(&self, tree: &DiffTree) -> Option<ReviewDecision> {
        self.decide(tree).unwrap_or_else(|e| {
            warn!("Review aborted: {}", e);
            None
        })
    }

    fn confirm_restrictions(&self, restrictions: &[LibraryRestriction]) -> bool {
        print_restrictions(restrictions);
        if self.options.confirm_restrictions {
            return true;
        }
        self.options.interactive
            && Confirm::new()
                .with_prompt("Commit anyway?")
                .default(false)
                .interact()
                .unwrap_or_else(|e| {
                    warn!("Confirmation aborted: {}", e);
                    false
                })
    }
}

pub fn run(workspace: Option<PathBuf>, options: CommitOptions) -> Result<()> {
    if options.message.is_none() && !options.interactive {
        anyhow::bail!("A commit message is required. Use -m \"message\" or --interactive.");
    }

    let workspace = Workspace::open(workspace)?;
    let orchestrator = Arc::new(workspace.orchestrator()?);
    let reviewer = PromptReviewer {
        has_remote: orchestrator.config().remote.is_some(),
        options,
    };

    let handle = job::spawn("commit", move |ctx| orchestrator.run(&reviewer, ctx))?;
    print_outcome(handle.join()?);
    Ok(())
}

fn print_outcome(outcome: FlowOutcome) {
    let (commit, push) = match outcome {
        FlowOutcome::Skipped(reason) => {
            print_skip(reason);
            return;
        }
        FlowOutcome::Committed { commit, push } => (commit, push),
    };

    println!("{}", "✓ Commit created successfully!".green().bold());
    println!("  {}: {}", "Commit ID".bold(), commit.id);
    println!("  {}: {}", "Message".bold(), commit.message);
    println!("  {}: {}", "Author".bold(), commit.author);

    match push {
        PushOutcome::NotRequested => {}
        PushOutcome::Completed(result) => print_result(&result),
        PushOutcome::Failed(message) => {
            println!("{} {}", "✗ Push failed:".red().bold(), message);
            println!(
                "The commit was kept locally. Run {} to retry.",
                "modelgit push".cyan()
            );
        }
    }
}

fn print_skip(reason: SkipReason) {
    match reason {
        SkipReason::NoIdentity => {
            println!("{}", "No author configured, nothing committed".yellow());
            println!(
                "Run {} to set one",
                "modelgit init --name <name> --email <email>".cyan()
            );
        }
        SkipReason::NothingToCommit => println!("{}", "No changes to commit".yellow()),
        SkipReason::ReviewCancelled => println!("{}", "Commit cancelled".yellow()),
        SkipReason::NothingSelected => println!("{}", "No changes selected".yellow()),
        SkipReason::RestrictionsDeclined => println!(
            "{} Pass {} to commit anyway",
            "Commit aborted.".red(),
            "--yes".cyan()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgit_core::{Change, DiffTreeBuilder, DiffType};

    #[test]
    fn test_selection_spec_defaults_to_all() {
        let mut options = CommitOptions {
            message: Some("m".to_string()),
            select: Vec::new(),
            interactive: false,
            push: false,
            skip_library_check: false,
            confirm_restrictions: false,
            lock_new_elements: false,
        };
        assert!(matches!(options.selection_spec(), SelectionSpec::All));

        options.select.push((ModelType::Flow, "a".to_string()));
        assert!(options.selection_spec().contains(ModelType::Flow, "a"));
        assert!(!options.selection_spec().contains(ModelType::Flow, "b"));
    }

    fn options(select: Vec<(ModelType, String)>) -> CommitOptions {
        CommitOptions {
            message: Some("from flags".to_string()),
            select,
            interactive: false,
            push: true,
            skip_library_check: false,
            confirm_restrictions: false,
            lock_new_elements: false,
        }
    }

    fn tree() -> DiffTree {
        let changes = vec![
            Change::new(ModelType::Flow, "a", "x/a", DiffType::Added),
            Change::new(ModelType::Flow, "b", "x/b", DiffType::Modified),
        ];
        DiffTreeBuilder::new().build(changes).into_tree().unwrap()
    }

    #[test]
    fn test_reviewer_uses_flags_without_prompting() {
        let reviewer = PromptReviewer {
            options: options(vec![(ModelType::Flow, "b".to_string())]),
            has_remote: true,
        };
        let decision = reviewer.review(&tree()).unwrap();
        assert_eq!(decision.message, "from flags");
        assert!(decision.push);
        let ids: Vec<_> = decision.selected.iter().map(|c| c.ref_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_reviewer_declines_restrictions_without_yes() {
        let restriction = LibraryRestriction {
            dataset_ref_id: "a".to_string(),
            library_name: "ecoinvent".to_string(),
            model_type: Some(ModelType::Flow),
            path: Some("x/a".to_string()),
        };
        let mut reviewer = PromptReviewer {
            options: options(Vec::new()),
            has_remote: false,
        };
        assert!(!reviewer.confirm_restrictions(&[restriction.clone()]));

        reviewer.options.confirm_restrictions = true;
        assert!(reviewer.confirm_restrictions(&[restriction]));
    }
}
