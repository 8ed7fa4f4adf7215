#![doc = "docs-sync-core: core logic library for docs-sync."]

//! This crate contains the whole publishing pipeline for docs-sync: change
//! detection over a git diff, per-integration docs builds, staging of the
//! generated markdown and the sync of staged pages to a docs host.
//! The concrete HTTP client for the docs host lives in the CLI crate; this
//! crate only talks to it through [`contract::DocsHost`].
//!
//! # Usage
//! Build a [`config::SyncConfig`], pick implementations of the three
//! [`contract`] traits and call [`synchronise::synchronise`].

pub mod build;
pub mod config;
pub mod contract;
pub mod detect;
pub mod error;
pub mod publish;
pub mod stage;
pub mod synchronise;

pub use config::{FailurePolicy, SyncConfig};
pub use detect::ChangeSet;
pub use error::{BuildError, DetectError, PublishError, StageError, SyncError};
pub use synchronise::{synchronise, synchronise_report, RunState, SyncReport};
