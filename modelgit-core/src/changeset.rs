use crate::database::ModelDatabase;
use crate::error::{Result, StorageContext};
use crate::models::{Change, DiffType, ModelType, TreeEntry};
use crate::storage::Storage;
use crate::workspace_ids::WorkspaceIds;
use std::collections::BTreeMap;
use tracing::debug;

/// Computes the changes of the working copy, or of one commit, relative to a
/// reference commit.
pub struct ChangeSetBuilder<'a> {
    store: &'a Storage,
}

impl<'a> ChangeSetBuilder<'a> {
    pub fn new(store: &'a Storage) -> Self {
        Self { store }
    }

    /// Changes of the working copy relative to `commit` (`None` = empty tree).
    ///
    /// Ordered by type, path and ref id.
    pub fn workspace(
        &self,
        db: &ModelDatabase,
        ids: &WorkspaceIds,
        commit: Option<&str>,
    ) -> Result<Vec<Change>> {
        let mut reference = index(self.store.tree(commit).during("reading reference tree")?);
        let entities = db.all().during("reading model database")?;

        let mut changes = Vec::new();
        for entity in &entities {
            let workspace_id = ids
                .get_or_compute(entity, |e| Ok(e.object_id()?))
                .during("computing workspace ids")?;
            let key = (entity.model_type, entity.ref_id.clone());

            let diff_type = match reference.remove(&key) {
                Some(entry) if entry.object_id == workspace_id => continue,
                Some(_) => DiffType::Modified,
                None => DiffType::Added,
            };
            changes.push(
                Change::new(entity.model_type, &entity.ref_id, entity.path(), diff_type)
                    .with_object_id(workspace_id),
            );
        }

        changes.extend(
            reference
                .into_values()
                .map(|e| Change::new(e.model_type, e.ref_id, e.path, DiffType::Deleted)),
        );

        sort(&mut changes);
        debug!(
            "Workspace differs from {} in {} entities",
            commit.unwrap_or("<empty>"),
            changes.len()
        );
        Ok(changes)
    }

    /// Changes that turn the tree of `left` into the tree of `right`.
    pub fn between(&self, left: Option<&str>, right: &str) -> Result<Vec<Change>> {
        let mut before = index(self.store.tree(left).during("reading left tree")?);
        let after = self.store.tree(Some(right)).during("reading right tree")?;

        let mut changes = Vec::new();
        for entry in after {
            let diff_type = match before.remove(&entry.key()) {
                Some(old) if old.object_id == entry.object_id => continue,
                Some(_) => DiffType::Modified,
                None => DiffType::Added,
            };
            let object_id = entry.object_id.clone();
            changes.push(
                Change::new(entry.model_type, entry.ref_id, entry.path, diff_type)
                    .with_object_id(object_id),
            );
        }
        changes.extend(
            before
                .into_values()
                .map(|e| Change::new(e.model_type, e.ref_id, e.path, DiffType::Deleted)),
        );

        sort(&mut changes);
        Ok(changes)
    }
}

fn index(entries: Vec<TreeEntry>) -> BTreeMap<(ModelType, String), TreeEntry> {
    entries.into_iter().map(|e| (e.key(), e)).collect()
}

fn sort(changes: &mut [Change]) {
    changes.sort_by(|a, b| (a.model_type, &a.path, &a.ref_id).cmp(&(b.model_type, &b.path, &b.ref_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelEntity, PersonIdent};

    fn commit_entities(store: &Storage, entities: &[ModelEntity]) -> String {
        let mut entries = Vec::new();
        let mut objects = Vec::new();
        for entity in entities {
            let data = entity.canonical_bytes().unwrap();
            entries.push(TreeEntry {
                model_type: entity.model_type,
                ref_id: entity.ref_id.clone(),
                path: entity.path(),
                object_id: entity.object_id().unwrap(),
            });
            objects.push(data);
        }
        let head = store.head().unwrap();
        store
            .write_commit(
                head.as_deref(),
                &entries,
                &objects,
                "snapshot",
                &PersonIdent::new("T", "t@example.com"),
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_workspace_against_empty_tree() {
        let store = Storage::in_memory().unwrap();
        let db = ModelDatabase::in_memory().unwrap();
        let ids = WorkspaceIds::new();
        db.insert(&ModelEntity::new(ModelType::Flow, "a", "A").with_category("x")).unwrap();

        let changes = ChangeSetBuilder::new(&store).workspace(&db, &ids, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].diff_type, DiffType::Added);
        assert_eq!(changes[0].path, "x/A");
        assert!(changes[0].object_id.is_some());
    }

    #[test]
    fn test_workspace_detects_all_kinds() {
        let store = Storage::in_memory().unwrap();
        let db = ModelDatabase::in_memory().unwrap();
        let ids = WorkspaceIds::new();

        let kept = ModelEntity::new(ModelType::Flow, "kept", "Kept");
        let edited = ModelEntity::new(ModelType::Flow, "edited", "Edited");
        let removed = ModelEntity::new(ModelType::Actor, "removed", "Removed");
        let head = commit_entities(&store, &[kept.clone(), edited.clone(), removed.clone()]);

        db.insert(&kept).unwrap();
        db.insert(&edited.clone().with_content(serde_json::json!({"x": 1}))).unwrap();
        db.insert(&ModelEntity::new(ModelType::Process, "new", "New")).unwrap();

        let changes = ChangeSetBuilder::new(&store)
            .workspace(&db, &ids, Some(&head))
            .unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.ref_id.as_str(), c.diff_type))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("new", DiffType::Added),
                ("edited", DiffType::Modified),
                ("removed", DiffType::Deleted),
            ]
        );
        assert!(changes[2].object_id.is_none());
    }

    #[test]
    fn test_workspace_is_deterministic() {
        let store = Storage::in_memory().unwrap();
        let db = ModelDatabase::in_memory().unwrap();
        let ids = WorkspaceIds::new();
        for i in 0..20 {
            db.insert(&ModelEntity::new(ModelType::Flow, format!("f{i}"), format!("Flow {}", 20 - i)))
                .unwrap();
        }

        let builder = ChangeSetBuilder::new(&store);
        let first = builder.workspace(&db, &ids, None).unwrap();
        let second = builder.workspace(&db, &ids, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_between_commits() {
        let store = Storage::in_memory().unwrap();
        let a = ModelEntity::new(ModelType::Flow, "a", "A");
        let b = ModelEntity::new(ModelType::Flow, "b", "B");
        let first = commit_entities(&store, &[a.clone(), b]);
        let second = commit_entities(&store, &[a.with_category("moved")]);

        let changes = ChangeSetBuilder::new(&store).between(Some(&first), &second).unwrap();
        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.ref_id.as_str(), c.diff_type, c.path.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("b", DiffType::Deleted, "B"),
                ("a", DiffType::Modified, "moved/A"),
            ]
        );
    }
}
