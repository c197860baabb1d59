//! Drives a commit from workspace diff to push.
//!
//! ```text
//! prepare -> review -> check_libraries -> commit -> push
//! ```
//!
//! Each step halts the flow on failure and nothing is retried. A failed push
//! leaves the local commit in place.

use crate::changeset::ChangeSetBuilder;
use crate::config::Config;
use crate::database::ModelDatabase;
use crate::diff_tree::{BuildOutcome, DiffTree, DiffTreeBuilder};
use crate::error::{Error, Result, StorageContext};
use crate::job::JobContext;
use crate::library::LibraryCheck;
use crate::models::{
    Change, Commit, CommitResult, DiffType, LibraryRestriction, PersonIdent, TreeEntry,
};
use crate::remote::Remote;
use crate::storage::{Storage, REMOTE_HEAD};
use crate::workspace_ids::WorkspaceIds;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, info, warn};

/// What the user decided in the review dialog.
#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub selected: Vec<Change>,
    pub message: String,
    pub push: bool,
    pub skip_library_check: bool,
}

/// The interactive side of the flow.
pub trait Reviewer {
    /// `None` cancels the flow.
    fn review(&self, tree: &DiffTree) -> Option<ReviewDecision>;

    /// `true` commits despite the restrictions.
    fn confirm_restrictions(&self, restrictions: &[LibraryRestriction]) -> bool;
}

#[derive(Debug)]
pub struct Review {
    pub author: PersonIdent,
    pub changes: Vec<Change>,
    pub tree: DiffTree,
}

#[derive(Debug)]
pub enum Prepared {
    NoIdentity,
    NothingToCommit,
    Review(Review),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoIdentity,
    NothingToCommit,
    ReviewCancelled,
    NothingSelected,
    RestrictionsDeclined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    NotRequested,
    /// The remote answered; the status tells whether it accepted the push.
    Completed(CommitResult),
    /// The push could not be carried out. The local commit stays.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Skipped(SkipReason),
    Committed { commit: Commit, push: PushOutcome },
}

pub struct CommitOrchestrator {
    db: Arc<Mutex<ModelDatabase>>,
    store: Arc<Mutex<Storage>>,
    ids: Arc<WorkspaceIds>,
    config: Config,
    library_check: Option<Arc<dyn LibraryCheck>>,
    remote: Option<Arc<dyn Remote>>,
    commit_lock: Mutex<()>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::InvalidOperation(format!("{} lock poisoned", what)))
}

impl CommitOrchestrator {
    pub fn new(
        db: Arc<Mutex<ModelDatabase>>,
        store: Arc<Mutex<Storage>>,
        ids: Arc<WorkspaceIds>,
        config: Config,
    ) -> Self {
        Self {
            db,
            store,
            ids,
            config,
            library_check: None,
            remote: None,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn with_library_check(mut self, check: Arc<dyn LibraryCheck>) -> Self {
        self.library_check = Some(check);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changes of the working copy against `HEAD`.
    pub fn workspace_changes(&self) -> Result<Vec<Change>> {
        let store = lock(&self.store, "store")?;
        let db = lock(&self.db, "model database")?;
        let head = store.head().during("resolving HEAD")?;
        ChangeSetBuilder::new(&store).workspace(&db, &self.ids, head.as_deref())
    }

    pub fn prepare(&self) -> Result<Prepared> {
        let Some(author) = self.config.identity() else {
            debug!("No author identity configured, skipping commit");
            return Ok(Prepared::NoIdentity);
        };

        let changes = self.workspace_changes()?;
        match DiffTreeBuilder::new().build(changes.clone()) {
            BuildOutcome::Empty => {
                info!("No changes to commit");
                Ok(Prepared::NothingToCommit)
            }
            BuildOutcome::Tree(tree) => Ok(Prepared::Review(Review {
                author,
                changes,
                tree,
            })),
        }
    }

    pub fn library_check_required(&self) -> bool {
        self.config.library_check_enabled()
    }

    /// Restrictions for the selected changes. Empty when the check is skipped
    /// or not required.
    pub fn check_libraries(
        &self,
        selected: &[Change],
        skip: bool,
        ctx: &JobContext,
    ) -> Result<Vec<LibraryRestriction>> {
        if skip || !self.library_check_required() {
            debug!("Library check not required");
            return Ok(Vec::new());
        }
        let check = self.library_check.as_ref().ok_or_else(|| {
            Error::Precondition("library check required but no checker configured".to_string())
        })?;

        ctx.add_workers(1);
        ctx.checkpoint()?;
        info!("Checking {} changes against libraries", selected.len());
        let restrictions = check.check(selected)?;
        ctx.finish_worker();

        if !restrictions.is_empty() {
            warn!("{} changes collide with libraries", restrictions.len());
        }
        Ok(restrictions)
    }

    /// Writes a commit containing exactly `selected` on top of `HEAD`.
    pub fn commit(
        &self,
        selected: &[Change],
        message: &str,
        author: &PersonIdent,
        ctx: &JobContext,
    ) -> Result<Commit> {
        let _guard = match self.commit_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::CommitInProgress),
            Err(TryLockError::Poisoned(_)) => {
                return Err(Error::InvalidOperation("commit lock poisoned".to_string()))
            }
        };

        let effective: Vec<&Change> = selected.iter().filter(|c| c.has_changed()).collect();
        if effective.is_empty() {
            return Err(Error::InvalidOperation("no changes selected".to_string()));
        }

        ctx.add_workers(effective.len() + 1);
        ctx.checkpoint()?;

        let store = lock(&self.store, "store")?;
        let db = lock(&self.db, "model database")?;
        let head = store.head().during("resolving HEAD")?;
        let mut tree: BTreeMap<_, TreeEntry> = store
            .tree(head.as_deref())
            .during("reading HEAD tree")?
            .into_iter()
            .map(|e| (e.key(), e))
            .collect();

        let mut objects = Vec::new();
        let mut written = Vec::new();
        for change in &effective {
            match change.diff_type {
                DiffType::Added | DiffType::Modified => {
                    let entity = db
                        .get(change.model_type, &change.ref_id)
                        .during("reading model")?
                        .ok_or_else(|| {
                            Error::ModelNotFound(format!("{} {}", change.model_type, change.ref_id))
                        })?;
                    let data = entity.canonical_bytes().map_err(Error::from).during("serializing model")?;
                    let object_id = crate::models::hash_bytes(&data);
                    if change.object_id.as_deref() != Some(object_id.as_str()) {
                        debug!("{} {} changed since review", change.model_type, change.ref_id);
                    }
                    tree.insert(
                        change.key(),
                        TreeEntry {
                            model_type: change.model_type,
                            ref_id: change.ref_id.clone(),
                            path: entity.path(),
                            object_id: object_id.clone(),
                        },
                    );
                    objects.push(data);
                    written.push((change.model_type, change.ref_id.clone(), Some(object_id)));
                }
                DiffType::Deleted => {
                    tree.remove(&change.key());
                    written.push((change.model_type, change.ref_id.clone(), None));
                }
                DiffType::NoChange => {}
            }
            ctx.finish_worker();
        }

        ctx.checkpoint()?;
        let entries: Vec<TreeEntry> = tree.into_values().collect();
        let commit = store
            .write_commit(head.as_deref(), &entries, &objects, message, author)
            .during("writing commit")?;

        for (model_type, ref_id, object_id) in written {
            match object_id {
                Some(id) => self.ids.put(model_type, &ref_id, &id)?,
                None => self.ids.remove(model_type, &ref_id)?,
            }
        }
        ctx.finish_worker();

        info!(
            "Committed {} changes as {} by {}",
            effective.len(),
            commit.short_id(),
            author
        );
        Ok(commit)
    }

    /// Pushes the commits not yet known to the remote.
    ///
    /// On `OK` the remote-tracking ref moves to the pushed head; on rejection
    /// nothing local changes.
    pub fn push(&self, ctx: &JobContext) -> Result<CommitResult> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| Error::Precondition("no remote configured".to_string()))?;

        ctx.add_workers(2);
        let (head, pack) = {
            let store = lock(&self.store, "store")?;
            let Some(head) = store.head().during("resolving HEAD")? else {
                return Ok(CommitResult::ok(Vec::new()));
            };
            let tracking = store.get_ref(REMOTE_HEAD).during("resolving remote ref")?;
            if tracking.as_deref() == Some(head.as_str()) {
                debug!("Remote is up to date");
                return Ok(CommitResult::ok(Vec::new()));
            }
            let pack = store
                .pack(tracking.as_deref(), &head)
                .during("packing commits")?;
            (head, pack)
        };
        ctx.finish_worker();

        ctx.checkpoint()?;
        info!("Pushing {} commits", pack.commits.len());
        let result = remote.push(&pack)?;

        if result.is_ok() {
            lock(&self.store, "store")?
                .set_ref(REMOTE_HEAD, &head)
                .during("updating remote ref")?;
            info!("Pushed {} commits", result.new_commits.len());
        } else {
            warn!("Push rejected: {:?}", result.status);
        }
        ctx.finish_worker();
        Ok(result)
    }

    /// Runs the whole flow with `reviewer` taking the interactive decisions.
    pub fn run(&self, reviewer: &dyn Reviewer, ctx: &JobContext) -> Result<FlowOutcome> {
        let review = match self.prepare()? {
            Prepared::NoIdentity => return Ok(FlowOutcome::Skipped(SkipReason::NoIdentity)),
            Prepared::NothingToCommit => {
                return Ok(FlowOutcome::Skipped(SkipReason::NothingToCommit))
            }
            Prepared::Review(review) => review,
        };

        let Some(decision) = reviewer.review(&review.tree) else {
            return Ok(FlowOutcome::Skipped(SkipReason::ReviewCancelled));
        };
        if !decision.selected.iter().any(Change::has_changed) {
            return Ok(FlowOutcome::Skipped(SkipReason::NothingSelected));
        }

        let restrictions =
            self.check_libraries(&decision.selected, decision.skip_library_check, ctx)?;
        if !restrictions.is_empty() && !reviewer.confirm_restrictions(&restrictions) {
            return Ok(FlowOutcome::Skipped(SkipReason::RestrictionsDeclined));
        }

        let commit = self.commit(&decision.selected, &decision.message, &review.author, ctx)?;
        if !decision.push {
            return Ok(FlowOutcome::Committed {
                commit,
                push: PushOutcome::NotRequested,
            });
        }

        let push = match self.push(ctx) {
            Ok(result) => PushOutcome::Completed(result),
            Err(e) => {
                warn!("Push after commit {} failed: {}", commit.short_id(), e);
                PushOutcome::Failed(e.to_string())
            }
        };
        Ok(FlowOutcome::Committed { commit, push })
    }
}
