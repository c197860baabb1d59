//! # modelgit-server
//!
//! Collaboration server for modelgit: hosts pushed repositories and checks
//! submitted datasets against protected reference libraries.

pub mod api;
pub mod libraries;
pub mod repositories;
pub mod server;

pub use libraries::LibraryRegistry;
pub use server::CollaborationServer;
