//! Durable report persistence.
//!
//! One JSON document per repository under the per-repo directory, plus one
//! aggregate JSON document. Writes are whole-document overwrites, so
//! re-invocation with the same repository identifier is idempotent, and a
//! repository's artifact survives a later crash of the run.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::OutputConfig;
use crate::models::{AggregateReport, RepoReport};

/// A report write failed. Fatal for that artifact only, never for the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes per-repository and aggregate reports.
#[derive(Clone)]
pub struct ReportWriter {
    per_repo_dir: PathBuf,
    aggregate_path: PathBuf,
}

impl ReportWriter {
    /// Create a writer, ensuring the output directories exist.
    pub fn new(output: &OutputConfig) -> Result<Self, PersistenceError> {
        let per_repo_dir = PathBuf::from(&output.per_repo_dir);
        let aggregate_path = PathBuf::from(&output.aggregate_path);

        fs::create_dir_all(&per_repo_dir).map_err(|source| PersistenceError::Io {
            path: per_repo_dir.clone(),
            source,
        })?;
        if let Some(parent) = aggregate_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        Ok(Self {
            per_repo_dir,
            aggregate_path,
        })
    }

    /// Path of one repository's report artifact.
    pub fn per_repo_path(&self, repository: &str) -> PathBuf {
        self.per_repo_dir.join(format!("{repository}.json"))
    }

    /// Persist one repository's report.
    pub fn write_per_repo(&self, report: &RepoReport) -> Result<PathBuf, PersistenceError> {
        let path = self.per_repo_path(&report.repository);
        write_json(&path, report)?;
        debug!("Wrote per-repo report: {}", path.display());
        Ok(path)
    }

    /// Persist the aggregate report.
    pub fn write_aggregate(&self, aggregate: &AggregateReport) -> Result<PathBuf, PersistenceError> {
        write_json(&self.aggregate_path, aggregate)?;
        debug!("Wrote aggregate report: {}", self.aggregate_path.display());
        Ok(self.aggregate_path.clone())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| {
        PersistenceError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    fs::write(path, json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
