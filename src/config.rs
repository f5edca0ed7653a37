//! Configuration handling.
//!
//! One immutable `Config` is constructed at startup from defaults, an
//! optional `.fleetaudit.toml`, and CLI/environment overrides, then passed
//! by reference into discovery, selection, budgeting, and scheduling.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// File and snippet selection settings.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Per-repository budget ceilings.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// LLM model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Report output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where repositories are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Base directories scanned for version-controlled repositories.
    /// A directory whose name contains "gitlab" tags its repositories as
    /// GitLab-sourced; everything else is GitHub-sourced.
    #[serde(default = "default_base_dirs")]
    pub base_dirs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_dirs: default_base_dirs(),
        }
    }
}

fn default_base_dirs() -> Vec<String> {
    vec!["repos".to_string()]
}

/// File and snippet selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Maximum source files selected per repository.
    #[serde(default = "default_max_files_per_repo")]
    pub max_files_per_repo: usize,

    /// Maximum excerpts extracted per selected file.
    #[serde(default = "default_snippets_per_file")]
    pub snippets_per_file: usize,

    /// Byte cap per excerpt.
    #[serde(default = "default_max_snippet_bytes")]
    pub max_snippet_bytes: usize,

    /// Cap on the path listing handed to path-shaped agents.
    #[serde(default = "default_max_paths_per_agent")]
    pub max_paths_per_agent: usize,

    /// File extensions recognized as source code.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names excluded from selection.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_files_per_repo: default_max_files_per_repo(),
            snippets_per_file: default_snippets_per_file(),
            max_snippet_bytes: default_max_snippet_bytes(),
            max_paths_per_agent: default_max_paths_per_agent(),
            extensions: default_extensions(),
            excludes: default_excludes(),
        }
    }
}

fn default_max_files_per_repo() -> usize {
    40
}

fn default_snippets_per_file() -> usize {
    1
}

fn default_max_snippet_bytes() -> usize {
    3000
}

fn default_max_paths_per_agent() -> usize {
    400
}

fn default_extensions() -> Vec<String> {
    vec![
        "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "c", "cpp", "h", "hpp", "cs", "rb",
        "php", "swift", "kt", "scala", "ipynb", "sh",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Per-repository budget ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum external agent calls per repository pass.
    #[serde(default = "default_max_calls_per_repo")]
    pub max_calls_per_repo: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_calls_per_repo: default_max_calls_per_repo(),
        }
    }
}

fn default_max_calls_per_repo() -> u64 {
    120
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier forwarded to LLM-backed agents.
    #[serde(default = "default_model")]
    pub name: String,

    /// Provider chat endpoint base URL.
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Opaque provider credential, forwarded as a bearer token when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Bounded retry count for transient call failures.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            endpoint_url: default_endpoint_url(),
            api_key: None,
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_endpoint_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    3
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent repository tasks. Kept small to respect
    /// provider-side rate limits.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Grace period in seconds granted to in-flight work after a stop
    /// signal before the repository is recorded as failed.
    #[serde(default = "default_cancel_grace_seconds")]
    pub cancel_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            cancel_grace_seconds: default_cancel_grace_seconds(),
        }
    }
}

fn default_max_concurrency() -> usize {
    2
}

fn default_cancel_grace_seconds() -> u64 {
    10
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Aggregate JSON output path.
    #[serde(default = "default_aggregate_path")]
    pub aggregate_path: String,

    /// Directory for per-repository JSON reports.
    #[serde(default = "default_per_repo_dir")]
    pub per_repo_dir: String,

    /// Also render a markdown fleet summary next to the aggregate.
    #[serde(default)]
    pub write_summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            aggregate_path: default_aggregate_path(),
            per_repo_dir: default_per_repo_dir(),
            write_summary: false,
        }
    }
}

fn default_aggregate_path() -> String {
    "data/fleet/aggregate.json".to_string()
}

fn default_per_repo_dir() -> String {
    "data/fleet/per_repo".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".fleetaudit.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI and environment values take precedence over the config file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bases) = args.base {
            self.discovery.base_dirs = bases.clone();
        }

        self.selector.max_files_per_repo = args.max_files;
        self.selector.snippets_per_file = args.snippets_per_file;
        self.selector.max_snippet_bytes = args.max_snippet_bytes;
        self.selector.max_paths_per_agent = args.max_paths_per_agent;

        self.budget.max_calls_per_repo = args.max_calls;

        self.model.name = args.model.clone();
        self.model.endpoint_url = args.endpoint_url.clone();
        self.model.temperature = args.temperature;
        if args.api_key.is_some() {
            self.model.api_key = args.api_key.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        self.scheduler.max_concurrency = args.max_workers;

        self.output.aggregate_path = args.out.to_string_lossy().into_owned();
        self.output.per_repo_dir = args.per_repo_dir.to_string_lossy().into_owned();
        if args.summary {
            self.output.write_summary = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.selector.max_files_per_repo, 40);
        assert_eq!(config.selector.max_snippet_bytes, 3000);
        assert_eq!(config.budget.max_calls_per_repo, 120);
        assert_eq!(config.scheduler.max_concurrency, 2);
        assert!(config.selector.extensions.contains(&"py".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[discovery]
base_dirs = ["github_repos", "gitlab_repos"]

[selector]
max_files_per_repo = 10
max_snippet_bytes = 1500

[budget]
max_calls_per_repo = 30

[model]
name = "qwen2.5-coder:32b"

[scheduler]
max_concurrency = 4
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(
            config.discovery.base_dirs,
            vec!["github_repos", "gitlab_repos"]
        );
        assert_eq!(config.selector.max_files_per_repo, 10);
        assert_eq!(config.selector.max_snippet_bytes, 1500);
        assert_eq!(config.budget.max_calls_per_repo, 30);
        assert_eq!(config.model.name, "qwen2.5-coder:32b");
        assert_eq!(config.scheduler.max_concurrency, 4);
        // Untouched sections keep their defaults.
        assert_eq!(config.selector.snippets_per_file, 1);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[discovery]"));
        assert!(toml_str.contains("[selector]"));
        assert!(toml_str.contains("[budget]"));
        assert!(toml_str.contains("[scheduler]"));
    }
}
