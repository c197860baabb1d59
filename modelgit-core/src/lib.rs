//! # modelgit-core
//!
//! Core library for modelgit - versioning of model databases with
//! selective commits.
//!
//! This crate holds the model database, the content-addressed commit store,
//! change set computation, the diff tree and selection model used for review,
//! library restriction checks and the commit/push flow tying them together.

pub mod changeset;
pub mod config;
pub mod database;
pub mod diff;
pub mod diff_tree;
pub mod error;
pub mod job;
pub mod library;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod selection;
pub mod storage;
pub mod workspace_ids;

pub use changeset::ChangeSetBuilder;
pub use config::Config;
pub use database::{ModelDatabase, ModelListener};
pub use diff::ModelDiff;
pub use diff_tree::{BuildOutcome, DiffTree, DiffTreeBuilder, NodeId};
pub use error::{Error, Result};
pub use library::LibraryCheck;
pub use models::{
    Change, Commit, CommitResult, DiffResult, DiffType, LibraryRestriction,
    ModelEntity, ModelType, PersonIdent, PushPack, PushStatus, SelectionSpec, TypeRefIdSet,
};
pub use orchestrator::{CommitOrchestrator, FlowOutcome, PushOutcome, Reviewer};
pub use remote::Remote;
pub use selection::SelectionModel;
pub use storage::Storage;
pub use workspace_ids::{WorkspaceIdUpdater, WorkspaceIds};
