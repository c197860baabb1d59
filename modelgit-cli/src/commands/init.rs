use super::{get_workspace_dir, Workspace};
use anyhow::Result;
use colored::Colorize;
use modelgit_core::config::RemoteConfig;
use modelgit_core::library::split_repository_id;
use modelgit_core::Config;
use std::path::PathBuf;

pub fn run(
    workspace: Option<PathBuf>,
    name: Option<String>,
    email: Option<String>,
    remote: Option<String>,
    repository: Option<String>,
) -> Result<()> {
    let dir = get_workspace_dir(workspace)?;
    let config_path = Config::path_in(&dir);
    let mut config = Config::load(&config_path)?;

    if name.is_some() {
        config.user.name = name;
    }
    if email.is_some() {
        config.user.email = email;
    }
    if let Some(url) = remote {
        let repository_id = repository.unwrap_or_default();
        split_repository_id(&repository_id)?;
        config.remote = Some(RemoteConfig {
            url,
            repository_id,
            collaboration_server: true,
            session_id: None,
            username: None,
            password: None,
        });
    }

    let workspace = Workspace::create(&dir, &config)?;

    println!("{}", "✓ Workspace initialized".green().bold());
    println!("   {}: {}", "Directory".bold(), workspace.dir.display());
    match workspace.config.identity() {
        Some(author) => println!("   {}: {}", "Author".bold(), author),
        None => println!(
            "   {}: {}",
            "Author".bold(),
            "not set, commits will be skipped".yellow()
        ),
    }
    if let Some(remote) = &workspace.config.remote {
        println!(
            "   {}: {} ({})",
            "Remote".bold(),
            remote.url.cyan(),
            remote.repository_id
        );
    }

    Ok(())
}
