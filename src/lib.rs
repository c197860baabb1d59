//! # modelgit
//!
//! Umbrella crate re-exporting the modelgit workspace members.

pub use modelgit_client as client;
pub use modelgit_core as core;
pub use modelgit_server as server;
