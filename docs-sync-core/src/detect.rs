//! Change detection: which integrations did a push touch?

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::ChangeDetector;
use crate::error::DetectError;

/// Base reference reported by a push that created a new branch.
pub const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Deduplicated, sorted names of changed integration directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    integrations: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn contains(&self, integration: &str) -> bool {
        self.integrations.contains(integration)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.integrations.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            integrations: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps repository-relative paths (as printed by `git diff --name-only`) to
/// the integration directories directly below `root`.
///
/// Only files inside an integration count: `integrations/README.md` names no
/// integration, `integrations/foo/pyproject.toml` names `foo`.
pub fn changed_integrations<I, S>(paths: I, root: &str) -> ChangeSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let root_parts: Vec<&str> = root.split('/').filter(|p| !p.is_empty() && *p != ".").collect();

    paths
        .into_iter()
        .filter_map(|path| {
            let path = path.as_ref();
            let mut parts = path
                .trim_start_matches("./")
                .split('/')
                .filter(|p| !p.is_empty());
            for expected in &root_parts {
                if parts.next() != Some(*expected) {
                    return None;
                }
            }
            let name = parts.next()?;
            // Require something below the integration directory itself.
            parts.next()?;
            Some(name.to_string())
        })
        .collect()
}

/// [`ChangeDetector`] backed by the `git` binary of the local checkout.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    repo_root: PathBuf,
    integrations_root: String,
}

impl GitChangeDetector {
    pub fn new(repo_root: impl Into<PathBuf>, integrations_root: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            integrations_root: integrations_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output, DetectError> {
        debug!(?args, repo_root = %self.repo_root.display(), "Running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                error!(error = ?e, ?args, "Failed to launch git process");
                DetectError::Git(format!("failed to run git: {e}"))
            })
    }

    async fn verify_commit(&self, reference: &str) -> Result<(), DetectError> {
        if reference.is_empty() || reference.starts_with('-') {
            return Err(DetectError::DiffUnavailable {
                reference: reference.to_string(),
                reason: "not a valid commit reference".to_string(),
            });
        }
        let rev = format!("{reference}^{{commit}}");
        let output = self.git(&["rev-parse", "--verify", "--quiet", &rev]).await?;
        if !output.status.success() {
            error!(reference, "Commit reference cannot be resolved; is the history complete?");
            return Err(DetectError::DiffUnavailable {
                reference: reference.to_string(),
                reason: "unknown revision (shallow clone or missing fetch?)".to_string(),
            });
        }
        Ok(())
    }

    /// Paths added, copied, modified, renamed or type-changed between the
    /// two commits. Deleted paths are left out: there is nothing to build.
    async fn changed_paths(&self, base: &str, head: &str) -> Result<Vec<String>, DetectError> {
        let output = if base == NULL_SHA {
            info!(head, "Null base reference, treating every file in head as changed");
            self.git(&["ls-tree", "-r", "-z", "--name-only", head, "--"]).await?
        } else {
            self.git(&[
                "diff",
                "--name-only",
                "-z",
                "--no-renames",
                "--diff-filter=ACMRT",
                base,
                head,
                // Refs are never read as paths, even when a file shares the name.
                "--",
            ])
            .await?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(base, head, %stderr, "git diff failed");
            return Err(DetectError::Git(format!("git diff {base} {head} failed: {stderr}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    async fn detect(&self, base: &str, head: &str) -> Result<ChangeSet, DetectError> {
        info!(base, head, root = %self.integrations_root, "Detecting changed integrations");
        if base != NULL_SHA {
            self.verify_commit(base).await?;
        }
        self.verify_commit(head).await?;

        let paths = self.changed_paths(base, head).await?;
        let changes = changed_integrations(&paths, &self.integrations_root);
        info!(
            files = paths.len(),
            integrations = changes.len(),
            changed = ?changes.iter().collect::<Vec<_>>(),
            "Change detection complete"
        );
        Ok(changes)
    }
}
