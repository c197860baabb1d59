use crate::error::{Error, Result};
use crate::models::{
    hash_bytes, Commit, CommitResult, ModelType, PackedCommit, PackedObject, PersonIdent, PushPack,
    TreeEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

pub const HEAD: &str = "HEAD";
pub const REMOTE_HEAD: &str = "refs/remotes/origin";

/// Local versioned store: content-addressed objects, commits with full tree
/// snapshots, and refs.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY,
                data BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS commits (
                id TEXT PRIMARY KEY,
                parent TEXT,
                timestamp TEXT NOT NULL,
                message TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_email TEXT NOT NULL,
                FOREIGN KEY (parent) REFERENCES commits(id)
            );

            CREATE TABLE IF NOT EXISTS commit_entries (
                commit_id TEXT NOT NULL,
                model_type TEXT NOT NULL,
                ref_id TEXT NOT NULL,
                path TEXT NOT NULL,
                object_id TEXT NOT NULL,
                PRIMARY KEY (commit_id, model_type, ref_id),
                FOREIGN KEY (commit_id) REFERENCES commits(id),
                FOREIGN KEY (object_id) REFERENCES objects(id)
            );

            CREATE TABLE IF NOT EXISTS refs (
                name TEXT PRIMARY KEY,
                commit_id TEXT NOT NULL,
                FOREIGN KEY (commit_id) REFERENCES commits(id)
            );

            CREATE INDEX IF NOT EXISTS idx_commits_parent ON commits(parent);
            CREATE INDEX IF NOT EXISTS idx_entries_commit ON commit_entries(commit_id);
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;

        if version.is_none() {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    // Object operations
    pub fn put_object(&self, data: &[u8]) -> Result<String> {
        let id = hash_bytes(data);
        self.conn.execute(
            "INSERT OR IGNORE INTO objects (id, data) VALUES (?1, ?2)",
            params![id, data],
        )?;
        Ok(id)
    }

    pub fn get_object(&self, id: &str) -> Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT data FROM objects WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::ObjectNotFound(id.to_string()))
    }

    // Ref operations
    pub fn get_ref(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT commit_id FROM refs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_ref(&self, name: &str, commit_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO refs (name, commit_id) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET commit_id = excluded.commit_id",
            params![name, commit_id],
        )?;
        Ok(())
    }

    pub fn head(&self) -> Result<Option<String>> {
        self.get_ref(HEAD)
    }

    // Commit operations

    /// Full tree of a commit, ordered by type, path and ref id. `None` is the
    /// empty tree of a repository without commits.
    pub fn tree(&self, commit_id: Option<&str>) -> Result<Vec<TreeEntry>> {
        let Some(commit_id) = commit_id else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT model_type, ref_id, path, object_id FROM commit_entries WHERE commit_id = ?1",
        )?;
        let mut entries = stmt
            .query_map(params![commit_id], entry_from_row)?
            .collect::<rusqlite::Result<Vec<TreeEntry>>>()?;

        entries.sort_by(|a, b| (a.model_type, &a.path, &a.ref_id).cmp(&(b.model_type, &b.path, &b.ref_id)));
        Ok(entries)
    }

    /// Writes a commit on top of `parent` and moves `HEAD` to it.
    ///
    /// Fails when `HEAD` no longer points at `parent`.
    pub fn write_commit(
        &self,
        parent: Option<&str>,
        entries: &[TreeEntry],
        objects: &[Vec<u8>],
        message: &str,
        author: &PersonIdent,
    ) -> Result<Commit> {
        let tx = self.conn.unchecked_transaction()?;

        if self.head()?.as_deref() != parent {
            return Err(Error::InvalidOperation(format!(
                "HEAD moved while committing on top of {}",
                parent.unwrap_or("<root>")
            )));
        }

        for data in objects {
            self.put_object(data)?;
        }

        let timestamp = Utc::now();
        let commit = Commit {
            id: commit_id(parent, entries, message, author, &timestamp),
            parent: parent.map(str::to_string),
            timestamp,
            message: message.to_string(),
            author: author.clone(),
        };

        self.insert_commit(&commit, entries)?;
        self.set_ref(HEAD, &commit.id)?;
        tx.commit()?;

        info!("Wrote commit {} with {} entries", commit.short_id(), entries.len());
        Ok(commit)
    }

    fn insert_commit(&self, commit: &Commit, entries: &[TreeEntry]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO commits (id, parent, timestamp, message, author_name, author_email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                commit.id,
                commit.parent,
                commit.timestamp.to_rfc3339(),
                commit.message,
                commit.author.name,
                commit.author.email,
            ],
        )?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO commit_entries (commit_id, model_type, ref_id, path, object_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for entry in entries {
            stmt.execute(params![
                commit.id,
                entry.model_type.as_str(),
                entry.ref_id,
                entry.path,
                entry.object_id,
            ])?;
        }

        Ok(())
    }

    pub fn get_commit(&self, id: &str) -> Result<Commit> {
        self.conn
            .query_row(
                "SELECT id, parent, timestamp, message, author_name, author_email
                 FROM commits WHERE id = ?1",
                params![id],
                commit_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::CommitNotFound(id.to_string()))
    }

    /// Commits reachable from `HEAD`, most recent first.
    pub fn log(&self, limit: Option<usize>) -> Result<Vec<Commit>> {
        let mut commits = Vec::new();
        let mut next = self.head()?;

        while let Some(id) = next {
            if limit.is_some_and(|l| commits.len() >= l) {
                break;
            }
            let commit = self.get_commit(&id)?;
            next = commit.parent.clone();
            commits.push(commit);
        }

        Ok(commits)
    }

    /// Commits after `since` (exclusive) up to `until` (inclusive), oldest first.
    pub fn commits_between(&self, since: Option<&str>, until: &str) -> Result<Vec<Commit>> {
        let mut commits = Vec::new();
        let mut next = Some(until.to_string());

        while let Some(id) = next {
            if since == Some(id.as_str()) {
                break;
            }
            let commit = self.get_commit(&id)?;
            next = commit.parent.clone();
            commits.push(commit);
        }

        commits.reverse();
        Ok(commits)
    }

    // Transport

    /// Packs the commits after `since` up to `until` together with the objects
    /// they introduce.
    pub fn pack(&self, since: Option<&str>, until: &str) -> Result<PushPack> {
        let commits = self.commits_between(since, until)?;
        let mut known: HashSet<String> = self
            .tree(since)?
            .into_iter()
            .map(|e| e.object_id)
            .collect();

        let mut packed = Vec::with_capacity(commits.len());
        let mut objects = Vec::new();
        for commit in commits {
            let entries = self.tree(Some(&commit.id))?;
            for entry in &entries {
                if known.insert(entry.object_id.clone()) {
                    let data = self.get_object(&entry.object_id)?;
                    objects.push(PackedObject {
                        id: entry.object_id.clone(),
                        data: String::from_utf8_lossy(&data).into_owned(),
                    });
                }
            }
            packed.push(PackedCommit { commit, entries });
        }

        debug!("Packed {} commits, {} objects", packed.len(), objects.len());
        Ok(PushPack {
            expected_head: since.map(str::to_string),
            commits: packed,
            objects,
        })
    }

    /// Applies a pushed pack when it builds on the current `HEAD`.
    pub fn receive(&self, pack: &PushPack) -> Result<CommitResult> {
        let head = self.head()?;
        if head != pack.expected_head {
            info!(
                "Rejecting push: expected head {:?}, actual {:?}",
                pack.expected_head, head
            );
            return Ok(CommitResult::rejected_non_fast_forward());
        }

        let mut parent = head;
        for packed in &pack.commits {
            if packed.commit.parent != parent {
                return Err(Error::InvalidOperation(format!(
                    "Pushed commit {} does not continue the pushed history",
                    packed.commit.id
                )));
            }
            parent = Some(packed.commit.id.clone());
        }

        let tx = self.conn.unchecked_transaction()?;
        for object in &pack.objects {
            let id = self.put_object(object.data.as_bytes())?;
            if id != object.id {
                return Err(Error::InvalidOperation(format!(
                    "Object {} does not match its content",
                    object.id
                )));
            }
        }
        for packed in &pack.commits {
            self.insert_commit(&packed.commit, &packed.entries)?;
        }
        if let Some(last) = pack.commits.last() {
            self.set_ref(HEAD, &last.commit.id)?;
        }
        tx.commit()?;

        Ok(CommitResult::ok(
            pack.commits.iter().map(|p| p.commit.clone()).collect(),
        ))
    }
}

fn commit_id(
    parent: Option<&str>,
    entries: &[TreeEntry],
    message: &str,
    author: &PersonIdent,
    timestamp: &DateTime<Utc>,
) -> String {
    let mut content = String::new();
    content.push_str(&format!("parent {}\n", parent.unwrap_or("")));
    let sorted: BTreeMap<(ModelType, &str), &TreeEntry> = entries
        .iter()
        .map(|e| ((e.model_type, e.ref_id.as_str()), e))
        .collect();
    for entry in sorted.values() {
        content.push_str(&format!(
            "entry {} {} {} {}\n",
            entry.model_type, entry.ref_id, entry.object_id, entry.path
        ));
    }
    content.push_str(&format!("author {}\n", author));
    content.push_str(&format!("time {}\n", timestamp.to_rfc3339()));
    content.push_str(message);
    hash_bytes(content.as_bytes())
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(Error::InvalidOperation(message)),
    )
}

pub(crate) fn parse_model_type(index: usize, value: &str) -> rusqlite::Result<ModelType> {
    ModelType::parse(value).ok_or_else(|| conversion_error(index, format!("unknown model type {}", value)))
}

fn entry_from_row(row: &Row) -> rusqlite::Result<TreeEntry> {
    let model_type: String = row.get(0)?;
    Ok(TreeEntry {
        model_type: parse_model_type(0, &model_type)?,
        ref_id: row.get(1)?,
        path: row.get(2)?,
        object_id: row.get(3)?,
    })
}

fn commit_from_row(row: &Row) -> rusqlite::Result<Commit> {
    let timestamp: String = row.get(2)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| conversion_error(2, e.to_string()))?
        .into();

    Ok(Commit {
        id: row.get(0)?,
        parent: row.get(1)?,
        timestamp,
        message: row.get(3)?,
        author: PersonIdent {
            name: row.get(4)?,
            email: row.get(5)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PushStatus;

    fn author() -> PersonIdent {
        PersonIdent::new("Tester", "tester@example.com")
    }

    fn entry(model_type: ModelType, ref_id: &str, data: &[u8]) -> TreeEntry {
        TreeEntry {
            model_type,
            ref_id: ref_id.to_string(),
            path: format!("cat/{}", ref_id),
            object_id: hash_bytes(data),
        }
    }

    #[test]
    fn test_storage_initialization() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.conn.is_autocommit());
        assert_eq!(storage.head().unwrap(), None);
        assert!(storage.tree(None).unwrap().is_empty());
    }

    #[test]
    fn test_write_commit_moves_head() {
        let storage = Storage::in_memory().unwrap();
        let data = b"{\"a\":1}".to_vec();
        let entries = vec![entry(ModelType::Flow, "a", &data)];

        let commit = storage
            .write_commit(None, &entries, &[data.clone()], "first", &author())
            .unwrap();

        assert_eq!(storage.head().unwrap(), Some(commit.id.clone()));
        assert_eq!(storage.tree(Some(&commit.id)).unwrap(), entries);
        assert_eq!(storage.get_object(&entries[0].object_id).unwrap(), data);
        assert_eq!(storage.get_commit(&commit.id).unwrap(), commit);
    }

    #[test]
    fn test_write_commit_rejects_stale_parent() {
        let storage = Storage::in_memory().unwrap();
        storage.write_commit(None, &[], &[], "first", &author()).unwrap();

        let result = storage.write_commit(None, &[], &[], "second", &author());
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_log_and_commits_between() {
        let storage = Storage::in_memory().unwrap();
        let c1 = storage.write_commit(None, &[], &[], "one", &author()).unwrap();
        let c2 = storage.write_commit(Some(&c1.id), &[], &[], "two", &author()).unwrap();
        let c3 = storage.write_commit(Some(&c2.id), &[], &[], "three", &author()).unwrap();

        let log: Vec<_> = storage.log(None).unwrap().into_iter().map(|c| c.message).collect();
        assert_eq!(log, vec!["three", "two", "one"]);
        assert_eq!(storage.log(Some(1)).unwrap().len(), 1);

        let between: Vec<_> = storage
            .commits_between(Some(&c1.id), &c3.id)
            .unwrap()
            .into_iter()
            .map(|c| c.message)
            .collect();
        assert_eq!(between, vec!["two", "three"]);
    }

    #[test]
    fn test_pack_and_receive() {
        let local = Storage::in_memory().unwrap();
        let remote = Storage::in_memory().unwrap();

        let data = b"{\"b\":2}".to_vec();
        let entries = vec![entry(ModelType::Process, "b", &data)];
        let c1 = local.write_commit(None, &entries, &[data], "first", &author()).unwrap();

        let pack = local.pack(None, &c1.id).unwrap();
        assert_eq!(pack.commits.len(), 1);
        assert_eq!(pack.objects.len(), 1);

        let result = remote.receive(&pack).unwrap();
        assert_eq!(result.status, PushStatus::Ok);
        assert_eq!(result.new_commits, vec![c1.clone()]);
        assert_eq!(remote.head().unwrap(), Some(c1.id.clone()));
        assert_eq!(remote.tree(Some(&c1.id)).unwrap(), entries);

        // Same pack again no longer builds on the remote head.
        let again = remote.receive(&pack).unwrap();
        assert_eq!(again.status, PushStatus::RejectedNonFastForward);
        assert!(again.new_commits.is_empty());
    }
}
