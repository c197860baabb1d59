use modelgit_core::library::RemoteRestriction;
use modelgit_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Protected reference libraries and the ref ids they contain.
#[derive(Debug, Clone, Default)]
pub struct LibraryRegistry {
    libraries: BTreeMap<String, BTreeSet<String>>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `{ "<library>": ["refId", ...] }`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let libraries: BTreeMap<String, BTreeSet<String>> = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid library file {}: {}", path.display(), e)))?;

        let registry = Self { libraries };
        info!(
            "Loaded {} libraries with {} datasets",
            registry.libraries.len(),
            registry.dataset_count()
        );
        Ok(registry)
    }

    pub fn with_library<I, S>(mut self, name: &str, ref_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libraries
            .entry(name.to_string())
            .or_default()
            .extend(ref_ids.into_iter().map(Into::into));
        self
    }

    pub fn dataset_count(&self) -> usize {
        self.libraries.values().map(BTreeSet::len).sum()
    }

    /// Restrictions for the submitted ref ids, in submission order.
    ///
    /// A ref id contained in several libraries is reported once, for the
    /// library that sorts first.
    pub fn restrictions(&self, ref_ids: &[String]) -> Vec<RemoteRestriction> {
        let mut seen = BTreeSet::new();
        ref_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                self.libraries
                    .iter()
                    .find(|(_, members)| members.contains(id))
                    .map(|(library, _)| RemoteRestriction {
                        dataset_ref_id: id.clone(),
                        library_name: library.clone(),
                    })
            })
            .collect()
    }
}
