pub mod commit;
pub mod diff;
pub mod init;
pub mod log;
pub mod models;
pub mod push;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use modelgit_client::CollaborationClient;
use modelgit_core::storage::Storage;
use modelgit_core::{
    CommitOrchestrator, Config, ModelDatabase, ModelEntity, ModelType, WorkspaceIdUpdater,
    WorkspaceIds,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const WORKSPACE_DIR: &str = ".modelgit";
const MODELS_DB: &str = "models.db";
const REPOSITORY_DB: &str = "repository.db";

pub fn get_workspace_dir(custom_path: Option<PathBuf>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path),
        None => Ok(std::env::current_dir()
            .context("Cannot determine current directory")?
            .join(WORKSPACE_DIR)),
    }
}

/// The working copy, its commit store and configuration.
pub struct Workspace {
    pub dir: PathBuf,
    pub config: Config,
    pub db: Arc<Mutex<ModelDatabase>>,
    pub store: Arc<Mutex<Storage>>,
    pub ids: Arc<WorkspaceIds>,
}

impl Workspace {
    pub fn open(dir: Option<PathBuf>) -> Result<Self> {
        let dir = get_workspace_dir(dir)?;
        if !dir.join(REPOSITORY_DB).exists() {
            anyhow::bail!("No modelgit workspace found. Run 'modelgit init' first.");
        }
        Self::open_at(dir)
    }

    fn open_at(dir: PathBuf) -> Result<Self> {
        let config = Config::load(&Config::path_in(&dir))?;
        let ids = Arc::new(WorkspaceIds::new());
        let mut db = ModelDatabase::new(dir.join(MODELS_DB))?;
        db.add_listener(Arc::new(WorkspaceIdUpdater::new(ids.clone())));
        let store = Storage::new(dir.join(REPOSITORY_DB))?;

        Ok(Self {
            dir,
            config,
            db: Arc::new(Mutex::new(db)),
            store: Arc::new(Mutex::new(store)),
            ids,
        })
    }

    /// Creates the workspace files, keeping an existing configuration.
    pub fn create(dir: &Path, config: &Config) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        config.save(&Config::path_in(dir))?;
        Self::open_at(dir.to_path_buf())
    }

    pub fn orchestrator(&self) -> Result<CommitOrchestrator> {
        let mut orchestrator = CommitOrchestrator::new(
            self.db.clone(),
            self.store.clone(),
            self.ids.clone(),
            self.config.clone(),
        );
        if let Some(remote) = &self.config.remote {
            let client = Arc::new(CollaborationClient::from_config(remote)?);
            orchestrator = orchestrator
                .with_library_check(client.clone())
                .with_remote(client);
        }
        Ok(orchestrator)
    }

    pub fn db(&self) -> Result<std::sync::MutexGuard<'_, ModelDatabase>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("model database lock poisoned"))
    }

    pub fn store(&self) -> Result<std::sync::MutexGuard<'_, Storage>> {
        self.store
            .lock()
            .map_err(|_| anyhow::anyhow!("store lock poisoned"))
    }
}

/// The entity as recorded in `commit`, if it is part of that commit.
pub fn committed_entity(
    store: &Storage,
    commit: Option<&str>,
    model_type: ModelType,
    ref_id: &str,
) -> Result<Option<ModelEntity>> {
    let Some(entry) = store
        .tree(commit)?
        .into_iter()
        .find(|e| e.model_type == model_type && e.ref_id == ref_id)
    else {
        return Ok(None);
    };
    let data = store.get_object(&entry.object_id)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgit_core::PersonIdent;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WORKSPACE_DIR);
        let mut config = Config::default();
        config.user.name = Some("Ann".to_string());

        Workspace::create(&path, &config).unwrap();
        let workspace = Workspace::open(Some(path)).unwrap();
        assert_eq!(workspace.config.user.name.as_deref(), Some("Ann"));
        assert!(workspace.orchestrator().is_ok());
    }

    #[test]
    fn test_local_commit_with_unreachable_remote() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WORKSPACE_DIR);
        let mut config = Config::default();
        config.user.name = Some("Ann".to_string());
        config.user.email = Some("ann@example.com".to_string());
        config.remote = Some(modelgit_core::config::RemoteConfig {
            url: "http://127.0.0.1:1".to_string(),
            repository_id: "lca/steel".to_string(),
            collaboration_server: true,
            session_id: None,
            username: Some("ann".to_string()),
            password: Some("secret".to_string()),
        });
        config.collaboration.check_against_libraries = false;

        let workspace = Workspace::create(&path, &config).unwrap();
        workspace
            .db()
            .unwrap()
            .insert(&ModelEntity::new(ModelType::Flow, "a", "Steel"))
            .unwrap();

        let orchestrator = workspace.orchestrator().unwrap();
        let changes = orchestrator.workspace_changes().unwrap();
        assert_eq!(changes.len(), 1);

        let ctx = modelgit_core::job::JobContext::detached();
        let restrictions = orchestrator.check_libraries(&changes, false, &ctx).unwrap();
        assert!(restrictions.is_empty());
        let commit = orchestrator
            .commit(&changes, "offline", &PersonIdent::new("Ann", "ann@example.com"), &ctx)
            .unwrap();
        assert_eq!(workspace.store().unwrap().head().unwrap(), Some(commit.id));
    }

    #[test]
    fn test_open_missing_workspace() {
        let dir = TempDir::new().unwrap();
        assert!(Workspace::open(Some(dir.path().join(WORKSPACE_DIR))).is_err());
    }

    #[test]
    fn test_committed_entity() {
        let store = Storage::in_memory().unwrap();
        let entity = ModelEntity::new(ModelType::Flow, "a", "Steel").with_category("metals");
        let entry = modelgit_core::models::TreeEntry {
            model_type: entity.model_type,
            ref_id: entity.ref_id.clone(),
            path: entity.path(),
            object_id: entity.object_id().unwrap(),
        };
        let commit = store
            .write_commit(
                None,
                &[entry],
                &[entity.canonical_bytes().unwrap()],
                "m",
                &PersonIdent::new("Ann", "a@x"),
            )
            .unwrap();

        let found = committed_entity(&store, Some(&commit.id), ModelType::Flow, "a").unwrap();
        assert_eq!(found, Some(entity));
        assert!(committed_entity(&store, None, ModelType::Flow, "a")
            .unwrap()
            .is_none());
    }
}
