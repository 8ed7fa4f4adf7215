//! Error types for the docs-sync pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::build::FailedBuild;
use crate::synchronise::RunState;

/// Errors raised while computing the set of changed integrations.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A commit reference could not be resolved, typically because the
    /// checkout is shallow and the base commit was never fetched.
    #[error("diff unavailable: cannot resolve {reference:?}: {reason}")]
    DiffUnavailable { reference: String, reason: String },

    /// Git could not be launched or returned an unexpected failure.
    #[error("git failed: {0}")]
    Git(String),
}

/// Errors raised by a build runner before a build outcome exists.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command is empty")]
    EmptyCommand,

    #[error("failed to launch {command:?} in {dir}: {source}")]
    Launch {
        command: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for docs build of {integration}: {source}")]
    Wait {
        integration: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while collecting artifacts into the staging area.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid artifact pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("staging I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {file_name} produced twice: {first} and {second}")]
    DuplicateArtifact {
        file_name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Errors raised while publishing staged pages to the docs host.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no API key configured for the docs host")]
    MissingCredential,

    #[error("docs host rejected the API key (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("docs host returned HTTP {status} for {slug}: {body}")]
    Http {
        slug: String,
        status: u16,
        body: String,
    },

    #[error("invalid docs host URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("transport error talking to the docs host: {0}")]
    Transport(String),

    #[error("invalid document {file}: {reason}")]
    InvalidDocument { file: String, reason: String },

    #[error("failed to read staged file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error of a whole synchronisation run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("docs build failed for {integration} (exit code {}):\n{output}", display_code(.exit_code))]
    BuildFailure {
        integration: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("docs build failed for {}", failed_names(.0))]
    BuildFailures(Vec<FailedBuild>),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("invalid run state transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl From<FailedBuild> for SyncError {
    fn from(failed: FailedBuild) -> Self {
        SyncError::BuildFailure {
            integration: failed.integration,
            exit_code: failed.exit_code,
            output: failed.output,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

fn failed_names(failures: &[FailedBuild]) -> String {
    failures
        .iter()
        .map(|f| f.integration.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
