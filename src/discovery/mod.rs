//! Repository discovery.
//!
//! Scans the configured base directories for version-controlled
//! repositories. The full repository list is known before scheduling
//! begins, which fleet-wide progress reporting and worker-pool sizing
//! rely on.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{Repository, SourceTag};

/// Discover repositories under every configured base directory.
///
/// An entry is a repository when git2 can open it; anything else is skipped
/// with a log line. Entries are returned sorted by name so fleet runs are
/// reproducible. An unreadable base directory is a configuration error and
/// aborts before any analysis work starts.
pub fn discover(config: &Config) -> Result<Vec<Repository>> {
    let mut repos = Vec::new();

    for base in &config.discovery.base_dirs {
        let base_path = Path::new(base);
        if !base_path.is_dir() {
            bail!("Base directory not found: {}", base);
        }
        let base_path = fs::canonicalize(base_path)
            .with_context(|| format!("Failed to resolve base directory: {}", base))?;

        let tag = source_tag_for(&base_path);
        let before = repos.len();
        scan_dir(&base_path, tag, &mut repos);
        info!(
            "Discovered {} repositories under {} ({})",
            repos.len() - before,
            base_path.display(),
            tag
        );
    }

    repos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(repos)
}

/// A base directory whose name mentions gitlab holds GitLab-sourced
/// repositories; everything else is treated as GitHub-sourced.
fn source_tag_for(base: &Path) -> SourceTag {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.contains("gitlab") {
        SourceTag::GitLab
    } else {
        SourceTag::GitHub
    }
}

/// Walk `dir` recursively, collecting repository roots. Does not descend
/// into a discovered repository, so nested checkouts count once.
fn scan_dir(dir: &Path, tag: SourceTag, repos: &mut Vec<Repository>) {
    if dir.join(".git").exists() {
        match git2::Repository::open(dir) {
            Ok(_) => {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string());
                let file_count = count_files(dir);
                debug!("Repository {} ({} files)", name, file_count);
                repos.push(Repository {
                    name,
                    path: dir.to_path_buf(),
                    source: tag,
                    file_count,
                });
            }
            Err(e) => {
                warn!(
                    "Skipping {}: .git present but not a valid repository: {}",
                    dir.display(),
                    e
                );
            }
        }
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            return;
        }
    };

    let mut subdirs: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    for subdir in subdirs {
        scan_dir(&subdir, tag, repos);
    }
}

/// Count files in a repository, excluding VCS metadata.
fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count()
}
