use modelgit_core::{Error, Result, Storage};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Hosted repositories, keyed by `group/name` and opened on first use.
///
/// The name may contain further `/` separated segments, stored as nested
/// directories. Without a data directory every repository lives in memory.
pub struct Repositories {
    data_dir: Option<PathBuf>,
    open: HashMap<String, Storage>,
}

impl Repositories {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            open: HashMap::new(),
        }
    }

    pub fn get(&mut self, group: &str, name: &str) -> Result<&Storage> {
        validate_segment(group)?;
        let segments: Vec<&str> = name.split('/').collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        let id = format!("{}/{}", group, name);

        if !self.open.contains_key(&id) {
            let storage = match &self.data_dir {
                Some(dir) => {
                    let (file, parents) = segments
                        .split_last()
                        .ok_or_else(|| Error::Precondition("empty repository name".to_string()))?;
                    let mut repo_dir = dir.join(group);
                    repo_dir.extend(parents);
                    std::fs::create_dir_all(&repo_dir)?;
                    Storage::new(repo_dir.join(format!("{}.db", file)))?
                }
                None => Storage::in_memory()?,
            };
            info!("Opened repository {}", id);
            self.open.insert(id.clone(), storage);
        }

        self.open
            .get(&id)
            .ok_or_else(|| Error::InvalidOperation(format!("repository {} vanished", id)))
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && segment != "."
        && segment != "..";
    if valid {
        Ok(())
    } else {
        Err(Error::Precondition(format!("invalid repository segment '{}'", segment)))
    }
}
