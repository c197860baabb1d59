use anyhow::Result;
use clap::{Parser, Subcommand};
use modelgit_core::ModelType;
use std::path::PathBuf;

mod commands;
mod display;

use commands::{commit, diff, init, log, models, push, serve, status};

#[derive(Parser)]
#[command(name = "modelgit")]
#[command(version, about = "Selective commit and push of model database changes", long_about = None)]
struct Cli {
    /// Workspace directory (defaults to ./.modelgit)
    #[arg(short = 'C', long, global = true)]
    workspace: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace
    Init {
        /// Author name
        #[arg(long)]
        name: Option<String>,

        /// Author email
        #[arg(long)]
        email: Option<String>,

        /// Collaboration server URL
        #[arg(long)]
        remote: Option<String>,

        /// Repository on the server as <group>/<name>
        #[arg(long, requires = "remote")]
        repository: Option<String>,
    },

    /// Insert or update models from a JSON file
    Put {
        /// File with one model or an array of models
        file: PathBuf,
    },

    /// Delete a model from the working copy
    Rm {
        #[arg(value_parser = parse_model_type)]
        model_type: ModelType,
        ref_id: String,
    },

    /// Show uncommitted changes
    Status,

    /// Show the content diff of uncommitted changes
    Diff {
        #[arg(value_parser = parse_model_type, requires = "ref_id")]
        model_type: Option<ModelType>,
        ref_id: Option<String>,
    },

    /// Commit selected changes
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Only commit these changes, as TYPE:REFID (defaults to all)
        #[arg(short, long = "select", value_parser = parse_selection)]
        select: Vec<(ModelType, String)>,

        /// Review the selection interactively
        #[arg(short, long)]
        interactive: bool,

        /// Push after committing
        #[arg(long)]
        push: bool,

        /// Do not check the selection against protected libraries
        #[arg(long)]
        skip_library_check: bool,

        /// Commit despite library restrictions
        #[arg(short, long)]
        yes: bool,

        /// Always include new models
        #[arg(long)]
        lock_new: bool,
    },

    /// Push local commits to the collaboration server
    Push,

    /// Show commit history
    Log {
        /// Number of commits to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run a collaboration server
    Serve {
        /// Port for the API server
        #[arg(short, long, default_value = "3030")]
        port: u16,

        /// Directory for hosted repositories (in memory when omitted)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// JSON file mapping library names to protected ref ids
        #[arg(short, long)]
        libraries: Option<PathBuf>,
    },
}

fn parse_model_type(s: &str) -> Result<ModelType, String> {
    ModelType::parse(s).ok_or_else(|| format!("unknown model type '{}'", s))
}

fn parse_selection(s: &str) -> Result<(ModelType, String), String> {
    let (model_type, ref_id) = s
        .split_once(':')
        .ok_or_else(|| format!("expected TYPE:REFID, got '{}'", s))?;
    if ref_id.is_empty() {
        return Err(format!("missing ref id in '{}'", s));
    }
    Ok((parse_model_type(model_type)?, ref_id.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let workspace = cli.workspace;
    match cli.command {
        Commands::Init {
            name,
            email,
            remote,
            repository,
        } => {
            init::run(workspace, name, email, remote, repository)?;
        }
        Commands::Put { file } => {
            models::put(workspace, file)?;
        }
        Commands::Rm { model_type, ref_id } => {
            models::remove(workspace, model_type, ref_id)?;
        }
        Commands::Status => {
            status::run(workspace)?;
        }
        Commands::Diff { model_type, ref_id } => {
            let target = model_type.zip(ref_id);
            diff::run(workspace, target)?;
        }
        Commands::Commit {
            message,
            select,
            interactive,
            push,
            skip_library_check,
            yes,
            lock_new,
        } => {
            let options = commit::CommitOptions {
                message,
                select,
                interactive,
                push,
                skip_library_check,
                confirm_restrictions: yes,
                lock_new_elements: lock_new,
            };
            commit::run(workspace, options)?;
        }
        Commands::Push => {
            push::run(workspace)?;
        }
        Commands::Log { limit } => {
            log::run(workspace, limit)?;
        }
        Commands::Serve {
            port,
            data_dir,
            libraries,
        } => {
            serve::run(port, data_dir, libraries)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection("flow:abc").unwrap(),
            (ModelType::Flow, "abc".to_string())
        );
        assert!(parse_selection("flow").is_err());
        assert!(parse_selection("flow:").is_err());
        assert!(parse_selection("nothing:abc").is_err());
    }

    #[test]
    fn test_cli_parses_commit() {
        let cli = Cli::try_parse_from([
            "modelgit",
            "commit",
            "-m",
            "msg",
            "--select",
            "PROCESS:p1",
            "--select",
            "flow:f1",
            "--push",
        ])
        .unwrap();
        match cli.command {
            Commands::Commit { select, push, .. } => {
                assert_eq!(select.len(), 2);
                assert!(push);
            }
            _ => panic!("expected commit"),
        }
    }
}
