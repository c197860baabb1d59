use crate::error::{Error, Result};
use crate::models::{ModelEntity, ModelType};
use crate::storage::parse_model_type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Receives notifications after entities of the working copy change.
pub trait ModelListener: Send + Sync {
    fn model_inserted(&self, entity: &ModelEntity);
    fn model_updated(&self, entity: &ModelEntity);
    fn model_deleted(&self, entity: &ModelEntity);
}

/// The live model database the user edits.
pub struct ModelDatabase {
    conn: Connection,
    listeners: Vec<Arc<dyn ModelListener>>,
}

impl ModelDatabase {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                model_type TEXT NOT NULL,
                ref_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                version TEXT NOT NULL,
                last_change INTEGER NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (model_type, ref_id)
            );
            "#,
        )?;
        Ok(Self {
            conn,
            listeners: Vec::new(),
        })
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ModelListener>) {
        self.listeners.push(listener);
    }

    pub fn insert(&self, entity: &ModelEntity) -> Result<()> {
        if self.get(entity.model_type, &entity.ref_id)?.is_some() {
            return Err(Error::InvalidOperation(format!(
                "{} {} already exists",
                entity.model_type, entity.ref_id
            )));
        }

        self.conn.execute(
            "INSERT INTO models (model_type, ref_id, name, category, version, last_change, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entity.model_type.as_str(),
                entity.ref_id,
                entity.name,
                entity.category,
                entity.version,
                entity.last_change,
                serde_json::to_string(&entity.content)?,
            ],
        )?;

        debug!("Inserted {} {}", entity.model_type, entity.ref_id);
        for listener in &self.listeners {
            listener.model_inserted(entity);
        }
        Ok(())
    }

    pub fn update(&self, entity: &ModelEntity) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE models SET name = ?1, category = ?2, version = ?3, last_change = ?4, content = ?5
             WHERE model_type = ?6 AND ref_id = ?7",
            params![
                entity.name,
                entity.category,
                entity.version,
                entity.last_change,
                serde_json::to_string(&entity.content)?,
                entity.model_type.as_str(),
                entity.ref_id,
            ],
        )?;

        if updated == 0 {
            return Err(Error::ModelNotFound(format!(
                "{} {}",
                entity.model_type, entity.ref_id
            )));
        }

        debug!("Updated {} {}", entity.model_type, entity.ref_id);
        for listener in &self.listeners {
            listener.model_updated(entity);
        }
        Ok(())
    }

    /// Inserts the entity or replaces the stored version.
    pub fn save(&self, entity: &ModelEntity) -> Result<()> {
        if self.get(entity.model_type, &entity.ref_id)?.is_some() {
            self.update(entity)
        } else {
            self.insert(entity)
        }
    }

    pub fn delete(&self, model_type: ModelType, ref_id: &str) -> Result<ModelEntity> {
        let entity = self
            .get(model_type, ref_id)?
            .ok_or_else(|| Error::ModelNotFound(format!("{} {}", model_type, ref_id)))?;

        self.conn.execute(
            "DELETE FROM models WHERE model_type = ?1 AND ref_id = ?2",
            params![model_type.as_str(), ref_id],
        )?;

        debug!("Deleted {} {}", model_type, ref_id);
        for listener in &self.listeners {
            listener.model_deleted(&entity);
        }
        Ok(entity)
    }

    pub fn get(&self, model_type: ModelType, ref_id: &str) -> Result<Option<ModelEntity>> {
        Ok(self
            .conn
            .query_row(
                "SELECT model_type, ref_id, name, category, version, last_change, content
                 FROM models WHERE model_type = ?1 AND ref_id = ?2",
                params![model_type.as_str(), ref_id],
                entity_from_row,
            )
            .optional()?)
    }

    /// All entities, ordered by type, category, name and ref id.
    pub fn all(&self) -> Result<Vec<ModelEntity>> {
        let mut stmt = self.conn.prepare(
            "SELECT model_type, ref_id, name, category, version, last_change, content FROM models",
        )?;
        let mut entities = stmt
            .query_map([], entity_from_row)?
            .collect::<rusqlite::Result<Vec<ModelEntity>>>()?;

        entities.sort_by(|a, b| {
            (a.model_type, &a.category, &a.name, &a.ref_id)
                .cmp(&(b.model_type, &b.category, &b.name, &b.ref_id))
        });
        Ok(entities)
    }
}

fn entity_from_row(row: &Row) -> rusqlite::Result<ModelEntity> {
    let model_type: String = row.get(0)?;
    let content: String = row.get(6)?;
    let content = serde_json::from_str(&content).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ModelEntity {
        model_type: parse_model_type(0, &model_type)?,
        ref_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        version: row.get(4)?,
        last_change: row.get(5)?,
        content,
    })
}
