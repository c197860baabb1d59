//! Cache of workspace ids: the object id each working-copy entity would have
//! in the versioned store.
//!
//! Model-change notifications only append to an invalidation log. The log is
//! applied under the same lock before any read, so a read that follows an
//! invalidation never observes the stale id.

use crate::database::ModelListener;
use crate::error::{Error, Result};
use crate::models::{ModelEntity, ModelType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

type Key = (ModelType, String);

#[derive(Default)]
struct Inner {
    ids: HashMap<Key, String>,
    invalidated: Vec<Key>,
}

impl Inner {
    fn apply_invalidations(&mut self) {
        for key in self.invalidated.drain(..) {
            self.ids.remove(&key);
        }
    }
}

#[derive(Default)]
pub struct WorkspaceIds {
    inner: Mutex<Inner>,
}

impl WorkspaceIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::InvalidOperation("workspace id cache poisoned".to_string()))
    }

    pub fn invalidate(&self, model_type: ModelType, ref_id: &str) -> Result<()> {
        trace!("Invalidating workspace id of {} {}", model_type, ref_id);
        self.lock()?.invalidated.push((model_type, ref_id.to_string()));
        Ok(())
    }

    pub fn get(&self, model_type: ModelType, ref_id: &str) -> Result<Option<String>> {
        let mut inner = self.lock()?;
        inner.apply_invalidations();
        Ok(inner.ids.get(&(model_type, ref_id.to_string())).cloned())
    }

    /// Returns the cached id, computing and storing it when absent.
    pub fn get_or_compute<F>(&self, entity: &ModelEntity, compute: F) -> Result<String>
    where
        F: FnOnce(&ModelEntity) -> Result<String>,
    {
        let key = (entity.model_type, entity.ref_id.clone());
        let mut inner = self.lock()?;
        inner.apply_invalidations();
        if let Some(id) = inner.ids.get(&key) {
            return Ok(id.clone());
        }
        let id = compute(entity)?;
        inner.ids.insert(key, id.clone());
        Ok(id)
    }

    pub fn put(&self, model_type: ModelType, ref_id: &str, object_id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.apply_invalidations();
        inner.ids.insert((model_type, ref_id.to_string()), object_id.to_string());
        Ok(())
    }

    pub fn remove(&self, model_type: ModelType, ref_id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.apply_invalidations();
        inner.ids.remove(&(model_type, ref_id.to_string()));
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        inner.apply_invalidations();
        Ok(inner.ids.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Invalidates workspace ids on every insert, update and delete.
pub struct WorkspaceIdUpdater {
    ids: Arc<WorkspaceIds>,
}

impl WorkspaceIdUpdater {
    pub fn new(ids: Arc<WorkspaceIds>) -> Self {
        Self { ids }
    }

    fn invalidate(&self, entity: &ModelEntity) {
        if let Err(e) = self.ids.invalidate(entity.model_type, &entity.ref_id) {
            tracing::error!("Failed to invalidate workspace id: {}", e);
        }
    }
}

impl ModelListener for WorkspaceIdUpdater {
    fn model_inserted(&self, entity: &ModelEntity) {
        self.invalidate(entity);
    }

    fn model_updated(&self, entity: &ModelEntity) {
        self.invalidate(entity);
    }

    fn model_deleted(&self, entity: &ModelEntity) {
        self.invalidate(entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ModelDatabase;

    #[test]
    fn test_read_after_invalidate() {
        let ids = WorkspaceIds::new();
        ids.put(ModelType::Flow, "a", "id-1").unwrap();
        assert_eq!(ids.get(ModelType::Flow, "a").unwrap().as_deref(), Some("id-1"));

        ids.invalidate(ModelType::Flow, "a").unwrap();
        assert_eq!(ids.get(ModelType::Flow, "a").unwrap(), None);
    }

    #[test]
    fn test_get_or_compute_caches() {
        let ids = WorkspaceIds::new();
        let entity = ModelEntity::new(ModelType::Source, "s1", "Report");
        let mut calls = 0;

        let first = ids
            .get_or_compute(&entity, |e| {
                calls += 1;
                Ok(e.object_id()?)
            })
            .unwrap();
        let second = ids
            .get_or_compute(&entity, |_| Ok("never".to_string()))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_updater_invalidates_on_database_events() {
        let ids = Arc::new(WorkspaceIds::new());
        let mut db = ModelDatabase::in_memory().unwrap();
        db.add_listener(Arc::new(WorkspaceIdUpdater::new(ids.clone())));

        let entity = ModelEntity::new(ModelType::Location, "l1", "Germany");
        db.insert(&entity).unwrap();
        ids.put(ModelType::Location, "l1", "stale").unwrap();

        db.update(&entity.clone().with_version("00.00.001")).unwrap();
        assert_eq!(ids.get(ModelType::Location, "l1").unwrap(), None);

        ids.put(ModelType::Location, "l1", "fresh").unwrap();
        db.delete(ModelType::Location, "l1").unwrap();
        assert!(ids.is_empty().unwrap());
    }
}
