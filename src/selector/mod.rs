//! File and snippet selection.
//!
//! For one repository, ranks and selects a bounded set of source files and
//! extracts byte-capped excerpts for the agents. Ranking and truncation are
//! deterministic: the same repository snapshot and the same caps always
//! yield the same ordered snippet sequence. All bounding happens here,
//! before any agent is invoked.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SelectorConfig;
use crate::models::{FileCandidate, Repository, Snippet};

/// Path fragments that mark a file as central to the project: entry
/// points, training/serving/pipeline code.
const PRIORITY_KEYWORDS: &[&str] = &[
    "src/",
    "train",
    "eval",
    "serve",
    "api",
    "pipeline",
    "dag",
    "flow",
    "inference",
];

/// Marker inserted between the head and tail halves of a condensed excerpt.
const ELLIPSIS_MARKER: &str = "\n# ...\n";

/// File and snippet selector for one run's configuration.
#[derive(Debug, Clone)]
pub struct FileSelector {
    config: SelectorConfig,
}

impl FileSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Select snippets for a repository.
    ///
    /// Unreadable files are skipped; zero qualifying files yields an empty
    /// sequence, which downstream agents must tolerate.
    pub fn select(&self, repo: &Repository) -> Vec<Snippet> {
        let candidates = self.candidates(repo);
        let mut snippets = Vec::new();

        for candidate in &candidates {
            let full_path = repo.path.join(&candidate.path);
            let text = match fs::read_to_string(&full_path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", candidate.path, e);
                    continue;
                }
            };

            for excerpt in extract_snippets(
                &text,
                self.config.max_snippet_bytes,
                self.config.snippets_per_file,
            ) {
                snippets.push(Snippet {
                    path: candidate.path.clone(),
                    text: excerpt,
                });
            }
        }

        debug!(
            "Selected {} snippets from {} files for {}",
            snippets.len(),
            candidates.len(),
            repo.name
        );
        snippets
    }

    /// Enumerate and rank source files, capped at the configured maximum.
    ///
    /// Ranking: files whose path mentions a priority keyword first, then
    /// smaller files, then path order as the final tie-break.
    pub fn candidates(&self, repo: &Repository) -> Vec<FileCandidate> {
        let mut candidates: Vec<FileCandidate> = self
            .walk(repo, false)
            .into_iter()
            .filter(|c| self.config.extensions.contains(&c.extension))
            .collect();

        candidates.sort_by(|a, b| {
            keyword_rank(&a.path)
                .cmp(&keyword_rank(&b.path))
                .then(a.size.cmp(&b.size))
                .then(a.path.cmp(&b.path))
        });
        candidates.truncate(self.config.max_files_per_repo);
        candidates
    }

    /// All file paths in the repository (any extension), sorted and capped
    /// for path-shaped agents. Hidden entries stay in: CI workflows live
    /// under dot-directories.
    pub fn all_paths(&self, repo: &Repository) -> Vec<String> {
        let mut paths: Vec<String> = self
            .walk(repo, true)
            .into_iter()
            .map(|c| c.path)
            .collect();
        paths.sort();
        paths.truncate(self.config.max_paths_per_agent);
        paths
    }

    fn walk(&self, repo: &Repository, include_hidden: bool) -> Vec<FileCandidate> {
        WalkDir::new(&repo.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if self.is_excluded(&name) {
                    return false;
                }
                include_hidden || !name.starts_with('.')
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let rel = entry
                    .path()
                    .strip_prefix(&repo.path)
                    .unwrap_or(entry.path());
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                FileCandidate {
                    path: rel.to_string_lossy().into_owned(),
                    size,
                    extension: extension_of(entry.path()),
                }
            })
            .collect()
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.config.excludes.iter().any(|pattern| name == pattern)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string()
}

fn keyword_rank(path: &str) -> usize {
    let lower = path.to_lowercase();
    if PRIORITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        0
    } else {
        1
    }
}

/// Extract up to `max_snippets` excerpts of at most `cap` bytes each.
///
/// A pure function of (content, cap, max_snippets):
/// - content at or under the cap passes through as a single excerpt;
/// - with `max_snippets == 1`, longer content is condensed to a head half
///   and a tail half joined by an ellipsis marker;
/// - otherwise the first `max_snippets` consecutive chunks are taken.
///
/// Excerpt boundaries never split a UTF-8 character.
pub fn extract_snippets(text: &str, cap: usize, max_snippets: usize) -> Vec<String> {
    if cap == 0 || max_snippets == 0 || text.is_empty() {
        return Vec::new();
    }

    if text.len() <= cap {
        return vec![text.to_string()];
    }

    if max_snippets == 1 {
        // Caps too small to hold the marker degrade to a plain head cut.
        if cap <= ELLIPSIS_MARKER.len() + 2 {
            return vec![text[..floor_char_boundary(text, cap)].to_string()];
        }
        let half = (cap - ELLIPSIS_MARKER.len()) / 2;
        let head_end = floor_char_boundary(text, half.max(1));
        let tail_start = ceil_char_boundary(text, text.len() - half.max(1));
        return vec![format!(
            "{}{}{}",
            &text[..head_end],
            ELLIPSIS_MARKER,
            &text[tail_start..]
        )];
    }

    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() && out.len() < max_snippets {
        let end = floor_char_boundary(text, (start + cap).min(text.len()));
        if end <= start {
            break;
        }
        out.push(text[start..end].to_string());
        start = end;
    }
    out
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceTag;
    use tempfile::TempDir;

    fn repo_at(dir: &TempDir) -> Repository {
        Repository {
            name: "fixture".to_string(),
            path: dir.path().to_path_buf(),
            source: SourceTag::GitHub,
            file_count: 0,
        }
    }

    fn selector(max_files: usize, cap: usize) -> FileSelector {
        let mut config = SelectorConfig::default();
        config.max_files_per_repo = max_files;
        config.max_snippet_bytes = cap;
        FileSelector::new(config)
    }

    #[test]
    fn test_selection_is_deterministic() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/train.py"), "def train():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("helper.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not source\n").unwrap();

        let repo = repo_at(&dir);
        let selector = selector(10, 3000);
        let first = selector.select(&repo);
        let second = selector.select(&repo);
        assert_eq!(first, second);
        assert!(!first.is_empty());
        // The .txt file never qualifies.
        assert!(first.iter().all(|s| !s.path.ends_with(".txt")));
    }

    #[test]
    fn test_three_files_cap_two_ranked() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.py"), "print('entry')\n").unwrap();
        std::fs::write(dir.path().join("train.py"), "print('train')\n").unwrap();
        std::fs::write(dir.path().join("zzz_util.py"), "print('util')\n").unwrap();

        let repo = repo_at(&dir);
        let snippets = selector(2, 3000).select(&repo);

        // Exactly two files survive the cap, and the keyword-ranked ones win.
        let paths: Vec<_> = snippets.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&"src/main.py"));
        assert!(paths.contains(&"train.py"));
    }

    #[test]
    fn test_excluded_dirs_are_pruned() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)\n").unwrap();

        let repo = repo_at(&dir);
        let candidates = selector(10, 3000).candidates(&repo);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "app.js");
    }

    #[test]
    fn test_empty_repo_yields_empty_sequence() {
        let dir = TempDir::new().unwrap();
        let repo = repo_at(&dir);
        assert!(selector(10, 3000).select(&repo).is_empty());
    }

    #[test]
    fn test_all_paths_sorted_and_capped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("c.txt"), "x").unwrap();

        let repo = repo_at(&dir);
        let mut config = SelectorConfig::default();
        config.max_paths_per_agent = 2;
        let paths = FileSelector::new(config).all_paths(&repo);
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_all_paths_keeps_hidden_ci_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();
        std::fs::write(dir.path().join(".github/workflows/ci.yml"), "on: push").unwrap();
        std::fs::write(dir.path().join("main.py"), "x = 1").unwrap();

        let repo = repo_at(&dir);
        let selector = FileSelector::new(SelectorConfig::default());
        let paths = selector.all_paths(&repo);
        assert!(paths.iter().any(|p| p.contains(".github/workflows")));

        // Hidden files never become snippet candidates, though.
        assert!(selector
            .candidates(&repo)
            .iter()
            .all(|c| !c.path.starts_with('.')));
    }

    #[test]
    fn test_short_content_passes_through() {
        let out = extract_snippets("short", 100, 1);
        assert_eq!(out, vec!["short"]);
    }

    #[test]
    fn test_condensed_excerpt_within_cap() {
        let text = "a".repeat(500);
        let out = extract_snippets(&text, 100, 1);
        assert_eq!(out.len(), 1);
        assert!(out[0].len() <= 100);
        assert!(out[0].contains(ELLIPSIS_MARKER.trim()));
        // Head and tail both survive.
        assert!(out[0].starts_with('a'));
        assert!(out[0].ends_with('a'));
    }

    #[test]
    fn test_chunked_extraction() {
        let text = "abcdefghij";
        let out = extract_snippets(text, 4, 2);
        assert_eq!(out, vec!["abcd", "efgh"]);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Multi-byte characters straddling the cap must not split.
        let text = "é".repeat(200);
        for out in extract_snippets(&text, 101, 1) {
            assert!(out.len() <= 101);
        }
        for chunk in extract_snippets(&text, 101, 3) {
            assert!(chunk.len() <= 101);
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }

    #[test]
    fn test_truncation_is_pure() {
        let text = "x".repeat(10_000);
        assert_eq!(
            extract_snippets(&text, 300, 2),
            extract_snippets(&text, 300, 2)
        );
    }
}
