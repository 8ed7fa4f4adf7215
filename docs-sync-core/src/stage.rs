//! Staging area: a flat temporary directory of generated docs pages.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::StageError;

/// Directories never searched for artifacts.
const SKIPPED_DIRS: &[&str] = &[".git", ".venv", "node_modules", "target", "__pycache__"];

/// File name convention of generated docs pages.
#[derive(Debug, Clone)]
pub struct ArtifactPattern(Regex);

impl ArtifactPattern {
    pub fn new(pattern: &str) -> Result<Self, StageError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| StageError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.0.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// One file copied into the staging area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedArtifact {
    /// Changed integration whose subtree produced the file.
    pub integration: String,
    pub source_path: PathBuf,
    pub staged_path: PathBuf,
    pub file_name: String,
}

/// Temporary directory holding the artifacts of one run.
///
/// Written by [`StagingArea::collect`], then only read. The directory is
/// removed when the value is dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    artifacts: Vec<StagedArtifact>,
    by_name: HashMap<String, PathBuf>,
}

impl StagingArea {
    pub fn new() -> Result<Self, StageError> {
        let dir = tempfile::Builder::new()
            .prefix("docs-sync-staging-")
            .tempdir()
            .map_err(|source| StageError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        debug!(path = %dir.path().display(), "Created staging area");
        Ok(Self {
            dir,
            artifacts: Vec::new(),
            by_name: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifacts(&self) -> &[StagedArtifact] {
        &self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Copy every file matching `pattern` below each integration's directory.
    /// Returns the number of files staged by this call.
    pub fn collect<'a, I>(
        &mut self,
        integrations_dir: &Path,
        integrations: I,
        pattern: &ArtifactPattern,
    ) -> Result<usize, StageError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let before = self.artifacts.len();
        for integration in integrations {
            let root = integrations_dir.join(integration);
            let mut found = Vec::new();
            find_artifacts(&root, pattern, &mut found)?;
            debug!(integration, count = found.len(), "Found artifacts");
            for source in found {
                self.stage_file(integration, &source)?;
            }
        }
        let staged = self.artifacts.len() - before;
        info!(
            staged,
            total = self.artifacts.len(),
            pattern = pattern.as_str(),
            staging = %self.path().display(),
            "Collected docs artifacts"
        );
        Ok(staged)
    }

    fn stage_file(&mut self, integration: &str, source: &Path) -> Result<(), StageError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(first) = self.by_name.get(&file_name) {
            return Err(StageError::DuplicateArtifact {
                file_name,
                first: first.clone(),
                second: source.to_path_buf(),
            });
        }

        let staged_path = self.dir.path().join(&file_name);
        fs::copy(source, &staged_path).map_err(|e| StageError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        debug!(integration, file = %file_name, "Staged artifact");

        self.by_name.insert(file_name.clone(), source.to_path_buf());
        self.artifacts.push(StagedArtifact {
            integration: integration.to_string(),
            source_path: source.to_path_buf(),
            staged_path,
            file_name,
        });
        Ok(())
    }
}

/// Depth-first, name-sorted walk; symlinked directories are not followed.
fn find_artifacts(
    dir: &Path,
    pattern: &ArtifactPattern,
    results: &mut Vec<PathBuf>,
) -> Result<(), StageError> {
    let io_err = |source| StageError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type().map_err(io_err)?;
        if file_type.is_dir() {
            if SKIPPED_DIRS.contains(&name.as_str()) {
                debug!(path = %path.display(), "Skipping directory");
                continue;
            }
            find_artifacts(&path, pattern, results)?;
        } else if pattern.matches(&name) && path.is_file() {
            results.push(path);
        }
    }
    Ok(())
}
