//! Workspace configuration stored in `.modelgit/config.toml`.

use crate::error::{Error, Result};
use crate::models::PersonIdent;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    #[serde(default)]
    pub collaboration: CollaborationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the collaboration server, e.g. `http://localhost:3030`
    pub url: String,

    /// `<group>/<name>` of the repository on the server
    pub repository_id: String,

    /// Whether the server enforces library restrictions
    #[serde(default = "default_true")]
    pub collaboration_server: bool,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationConfig {
    #[serde(default = "default_true")]
    pub check_against_libraries: bool,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            check_against_libraries: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn path_in(workspace_dir: &Path) -> PathBuf {
        workspace_dir.join(CONFIG_FILE)
    }

    /// Loads the configuration, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Author identity, if both name and email are configured.
    pub fn identity(&self) -> Option<PersonIdent> {
        let name = self.user.name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let email = self.user.email.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(PersonIdent::new(name, email))
    }

    /// The library check runs only when enabled locally and the remote enforces it.
    pub fn library_check_enabled(&self) -> bool {
        self.collaboration.check_against_libraries
            && self.remote.as_ref().is_some_and(|r| r.collaboration_server)
    }
}
