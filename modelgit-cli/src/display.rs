use anyhow::Result;
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use modelgit_core::diff::{DiffLineType, ModelDiff};
use modelgit_core::diff_tree::DiffTree;
use modelgit_core::job::JobHandle;
use modelgit_core::{Change, DiffType, LibraryRestriction};
use std::time::Duration;

pub fn diff_icon(diff_type: DiffType) -> ColoredString {
    match diff_type {
        DiffType::Added => "+".green(),
        DiffType::Modified => "~".yellow(),
        DiffType::Deleted => "-".red(),
        DiffType::NoChange => " ".normal(),
    }
}

pub fn diff_label(diff_type: DiffType) -> ColoredString {
    match diff_type {
        DiffType::Added => "NEW".green(),
        DiffType::Modified => "MOD".yellow(),
        DiffType::Deleted => "DEL".red(),
        DiffType::NoChange => "   ".normal(),
    }
}

pub fn change_line(change: &Change) -> String {
    format!(
        "{} {:<16} {}",
        diff_icon(change.diff_type),
        change.model_type.to_string().dimmed(),
        change.path
    )
}

/// Prints the tree indented by depth, marking selected models.
pub fn print_tree(tree: &DiffTree, is_selected: impl Fn(modelgit_core::NodeId) -> bool) {
    for id in tree.walk().into_iter().skip(1) {
        let node = tree.get(id);
        let indent = "  ".repeat(tree.depth(id) - 1);
        match node.diff_result() {
            Some(result) => {
                let mark = if is_selected(id) { "[x]" } else { "[ ]" };
                println!(
                    "{}{} {} {}",
                    indent,
                    mark.cyan(),
                    diff_icon(result.change.diff_type),
                    node.name()
                );
            }
            None => println!("{}{}", indent, (&*node.name()).bold()),
        }
    }
}

pub fn print_diff(diff: &ModelDiff) {
    for line in &diff.diff_lines {
        let (prefix, color): (&str, fn(&str) -> ColoredString) = match line.line_type {
            DiffLineType::Addition => ("+", |s| s.green()),
            DiffLineType::Deletion => ("-", |s| s.red()),
            DiffLineType::Context => (" ", |s| s.normal()),
        };
        print!("{}", color(&format!("{}{}", prefix, line.content)));
    }
}

pub fn print_restrictions(restrictions: &[LibraryRestriction]) {
    println!(
        "{}",
        "The following datasets belong to protected libraries:"
            .yellow()
            .bold()
    );
    for r in restrictions {
        let model_type = r
            .model_type
            .map(|t| t.to_string())
            .unwrap_or_default();
        println!(
            "  {} {:<16} {} ({})",
            "!".yellow(),
            model_type.dimmed(),
            r.path.as_deref().unwrap_or(&r.dataset_ref_id),
            r.library_name.cyan()
        );
    }
}

/// Waits for a job, showing a spinner with its progress.
pub fn wait_for<T>(message: &str, handle: JobHandle<T>) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    while !handle.is_finished() {
        let progress = handle.progress();
        if progress.workers > 0 {
            spinner.set_message(format!(
                "{} ({}/{})",
                message, progress.finished, progress.workers
            ));
        } else {
            spinner.set_message(message.to_string());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    spinner.finish_and_clear();
    Ok(handle.join()?)
}
