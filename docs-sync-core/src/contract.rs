//! # contract: the three seams of the publishing pipeline
//!
//! This module defines the traits the orchestrator in [`crate::synchronise`]
//! is written against, plus the plain data passed across them:
//!
//! - [`ChangeDetector`]: turns a commit pair into a [`ChangeSet`].
//! - [`BuildRunner`]: runs the docs build of one integration directory.
//! - [`DocsHost`]: the remote docs API the staged pages are synced to.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests and downstream crates
//!   (with the `test-export-mocks` feature) get `MockChangeDetector`,
//!   `MockBuildRunner` and `MockDocsHost`.
//!
//! ## Implementations
//! - [`crate::detect::GitChangeDetector`] and [`crate::build::CommandBuildRunner`]
//!   live in this crate; the HTTP docs host client lives in the CLI crate.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::Serialize;

use crate::detect::ChangeSet;
use crate::error::{BuildError, DetectError, PublishError};

/// Outcome of one integration's docs build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildResult {
    Succeeded {
        integration: String,
        duration_ms: u64,
    },
    Failed {
        integration: String,
        /// `None` when the process was killed (timeout, signal).
        exit_code: Option<i32>,
        /// Tail of the combined stdout/stderr.
        output: String,
        duration_ms: u64,
    },
}

impl BuildResult {
    pub fn integration(&self) -> &str {
        match self {
            BuildResult::Succeeded { integration, .. } | BuildResult::Failed { integration, .. } => {
                integration
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, BuildResult::Succeeded { .. })
    }
}

/// A markdown page ready to be sent to the docs host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocPage {
    pub slug: String,
    pub title: String,
    /// Markdown body without the front matter.
    pub body: String,
    pub category: Option<String>,
    pub category_slug: Option<String>,
    pub parent_doc: Option<String>,
    pub excerpt: Option<String>,
    pub hidden: bool,
    pub order: Option<i64>,
    /// SHA-256 hex digest of the raw staged file.
    pub content_hash: String,
}

/// What the docs host knows about a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDoc {
    pub slug: String,
    pub title: String,
    /// Hash stored by the last sync, if the page was created by a sync.
    pub last_updated_hash: Option<String>,
}

/// Computes which integrations changed between two commits.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    /// Fails with [`DetectError::DiffUnavailable`] when either reference
    /// cannot be resolved in the local history.
    async fn detect(&self, base: &str, head: &str) -> Result<ChangeSet, DetectError>;
}

/// Runs the docs build of a single integration.
///
/// A build that ran and exited non-zero is an `Ok(BuildResult::Failed)`;
/// `Err` is reserved for builds that could not be run at all.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(&self, integration: &str, dir: &Path) -> Result<BuildResult, BuildError>;
}

/// Remote docs API, addressed by page slug within a version label.
///
/// The implementor owns authentication and transport; every failure is
/// reported as a [`PublishError`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocsHost: Send + Sync {
    /// Look a page up; `Ok(None)` when the slug does not exist.
    async fn get_doc(&self, slug: &str, version: &str) -> Result<Option<RemoteDoc>, PublishError>;

    async fn create_doc(&self, doc: &DocPage, version: &str) -> Result<RemoteDoc, PublishError>;

    async fn update_doc(
        &self,
        slug: &str,
        doc: &DocPage,
        version: &str,
    ) -> Result<RemoteDoc, PublishError>;
}
