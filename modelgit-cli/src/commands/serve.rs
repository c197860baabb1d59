use anyhow::Result;
use colored::Colorize;
use modelgit_server::{CollaborationServer, LibraryRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;

pub fn run(port: u16, data_dir: Option<PathBuf>, libraries: Option<PathBuf>) -> Result<()> {
    let registry = match &libraries {
        Some(path) => LibraryRegistry::load(path)?,
        None => LibraryRegistry::new(),
    };
    if let Some(dir) = &data_dir {
        std::fs::create_dir_all(dir)?;
    }

    println!("{}", "🚀 Starting modelgit server...".bold().cyan());
    match &data_dir {
        Some(dir) => println!("   {}: {:?}", "Repositories".bold(), dir),
        None => println!("   {}: {}", "Repositories".bold(), "in memory".yellow()),
    }
    println!(
        "   {}: {}",
        "Protected datasets".bold(),
        registry.dataset_count()
    );
    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let server = CollaborationServer::new(data_dir, registry);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve(addr))
}
