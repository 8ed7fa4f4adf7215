//! Docs builds: run the configured command inside every changed integration.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{BuildConfig, FailurePolicy};
use crate::contract::{BuildResult, BuildRunner};
use crate::detect::ChangeSet;
use crate::error::BuildError;

/// Captured output kept per stream for reporting.
const OUTPUT_TAIL_BYTES: usize = 64 * 1024;

/// A failed build, as carried by [`crate::error::SyncError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBuild {
    pub integration: String,
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Runs an external command with the integration directory as working dir.
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandBuildRunner {
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Result<Self, BuildError> {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(BuildError::EmptyCommand);
        }
        Ok(Self { command, timeout })
    }

    pub fn from_config(config: &BuildConfig) -> Result<Self, BuildError> {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(config.command.clone(), timeout)
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn run(&self, integration: &str, dir: &Path) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let program = &self.command[0];
        info!(integration, dir = %dir.display(), command = ?self.command, "Starting docs build");

        let mut command = Command::new(program);
        command
            .args(&self.command[1..])
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so the tools the command launches can be killed with it.
        #[cfg(unix)]
        command.process_group(0);
        let child = command
            .spawn()
            .map_err(|source| {
                error!(integration, error = ?source, "Failed to launch docs build");
                BuildError::Launch {
                    command: self.command.join(" "),
                    dir: dir.to_path_buf(),
                    source,
                }
            })?;

        // Dropped last: on timeout, cancellation or a normal exit nothing the
        // build started outlives it.
        let _group = ProcessGroupGuard {
            integration: integration.to_string(),
            pgid: child.id(),
        };

        // Dropping `child` on timeout kills the process.
        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    let duration_ms = start.elapsed().as_millis() as u64;
                    error!(integration, timeout_secs = limit.as_secs(), "Docs build timed out");
                    return Ok(BuildResult::Failed {
                        integration: integration.to_string(),
                        exit_code: None,
                        output: format!("docs build timed out after {}s", limit.as_secs_f64()),
                        duration_ms,
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| BuildError::Wait {
            integration: integration.to_string(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        if output.status.success() {
            info!(integration, duration_ms, "Docs build succeeded");
            return Ok(BuildResult::Succeeded {
                integration: integration.to_string(),
                duration_ms,
            });
        }

        let mut combined = tail(&String::from_utf8_lossy(&output.stdout), OUTPUT_TAIL_BYTES);
        let stderr = tail(&String::from_utf8_lossy(&output.stderr), OUTPUT_TAIL_BYTES);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        error!(
            integration,
            exit_code = ?output.status.code(),
            duration_ms,
            "Docs build exited with failure"
        );
        Ok(BuildResult::Failed {
            integration: integration.to_string(),
            exit_code: output.status.code(),
            output: combined,
            duration_ms,
        })
    }
}

/// Kills the build's process group when dropped.
struct ProcessGroupGuard {
    integration: String,
    pgid: Option<u32>,
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(&self.integration, pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(integration: &str, pgid: u32) {
    let target = format!("-{pgid}");
    let status = std::process::Command::new("kill")
        .args(["-KILL", "--", &target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => {
            debug!(integration, pgid, "Killed leftover docs build processes")
        }
        // Group already empty.
        Ok(_) => {}
        Err(e) => warn!(integration, pgid, error = ?e, "Failed to kill docs build process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_integration: &str, _pgid: u32) {}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = s.len() - max;
    while !s.is_char_boundary(cut) {
        cut += 1;
    }
    s[cut..].to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub max_parallel: usize,
    pub failure_policy: FailurePolicy,
}

impl From<&BuildConfig> for BuildOptions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            failure_policy: config.failure_policy,
        }
    }
}

/// Results of building every changed integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// In change-set order. Under fail-fast this stops at the first failure.
    pub results: Vec<BuildResult>,
    /// Changed integrations whose directory no longer exists.
    pub skipped: Vec<String>,
}

impl BuildSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.succeeded())
            .map(BuildResult::integration)
    }

    pub fn failures(&self) -> Vec<FailedBuild> {
        self.results
            .iter()
            .filter_map(|r| match r {
                BuildResult::Failed {
                    integration,
                    exit_code,
                    output,
                    ..
                } => Some(FailedBuild {
                    integration: integration.clone(),
                    exit_code: *exit_code,
                    output: output.clone(),
                }),
                BuildResult::Succeeded { .. } => None,
            })
            .collect()
    }
}

/// Build every integration of `changes` found under `integrations_dir`.
///
/// Up to `max_parallel` builds run at once. Under [`FailurePolicy::FailFast`]
/// no new build starts after the first failure and builds still running are
/// dropped, which kills their processes.
pub async fn build_all<R>(
    runner: &R,
    changes: &ChangeSet,
    integrations_dir: &Path,
    options: BuildOptions,
) -> Result<BuildSummary, BuildError>
where
    R: BuildRunner + ?Sized,
{
    let mut summary = BuildSummary::default();
    let mut targets: Vec<(String, PathBuf)> = Vec::new();
    for integration in changes.iter() {
        let dir = integrations_dir.join(integration);
        if dir.is_dir() {
            targets.push((integration.to_string(), dir));
        } else {
            warn!(integration, dir = %dir.display(), "Changed integration has no directory, skipping build");
            summary.skipped.push(integration.to_string());
        }
    }

    let max_parallel = options.max_parallel.max(1);
    info!(builds = targets.len(), max_parallel, policy = ?options.failure_policy, "Running docs builds");

    let mut builds = stream::iter(targets)
        .map(|(integration, dir)| async move { runner.run(&integration, &dir).await })
        .buffered(max_parallel);

    while let Some(result) = builds.next().await {
        let result = result?;
        let failed = !result.succeeded();
        summary.results.push(result);
        if failed && options.failure_policy == FailurePolicy::FailFast {
            warn!("Fail-fast policy: abandoning remaining docs builds");
            break;
        }
    }

    Ok(summary)
}
