// docs-sync-core/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_INTEGRATIONS_ROOT: &str = "integrations";
pub const DEFAULT_ARTIFACT_PATTERN: &str = r"^_readme_.*\.md$";
pub const DEFAULT_VERSION: &str = "2.0";
pub const DEFAULT_BASE_URL: &str = "https://dash.readme.com";
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

/// Everything a run needs except the commit pair and the docs host credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Root of the git checkout.
    pub repo_root: PathBuf,
    /// Directory below `repo_root` whose direct children are integrations.
    pub integrations_root: String,
    pub build: BuildConfig,
    pub artifacts: ArtifactConfig,
    pub publish: PublishConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            integrations_root: DEFAULT_INTEGRATIONS_ROOT.to_string(),
            build: BuildConfig::default(),
            artifacts: ArtifactConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn integrations_dir(&self) -> PathBuf {
        self.repo_root.join(&self.integrations_root)
    }

    pub fn trace_loaded(&self) {
        info!(
            repo_root = %self.repo_root.display(),
            integrations_root = %self.integrations_root,
            build_command = ?self.build.command,
            failure_policy = ?self.build.failure_policy,
            version = %self.publish.version,
            dry_run = self.publish.dry_run,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Program and arguments, run inside each changed integration directory.
    pub command: Vec<String>,
    /// Per-build timeout; `0` disables it.
    pub timeout_secs: u64,
    /// Number of integrations built concurrently.
    pub max_parallel: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["hatch".into(), "run".into(), "docs".into()],
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            max_parallel: 1,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// What to do when one integration's docs build fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed build; nothing is published.
    #[default]
    FailFast,
    /// Build everything, publish what succeeded, still fail the run.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactConfig {
    /// Regex matched against generated file names (not paths).
    pub pattern: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_ARTIFACT_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Docs version label that receives the pages.
    pub version: String,
    pub base_url: String,
    pub dry_run: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            dry_run: false,
        }
    }
}
