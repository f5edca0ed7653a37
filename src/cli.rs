//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap, including
//! validation and environment-sourced defaults.

use clap::Parser;
use std::path::PathBuf;

/// FleetAudit - engineering-quality assessor for fleets of local repos
///
/// Discovers version-controlled repositories under one or more base
/// directories, runs a fixed set of analysis agents against each under
/// strict call/byte budgets, and writes per-repo and aggregate reports.
///
/// Examples:
///   fleetaudit
///   fleetaudit --base github_repos --base gitlab_repos --max-workers 4
///   fleetaudit --out data/fleet/aggregate.json --per-repo-dir data/fleet/per_repo
///   fleetaudit --dry-run
///   fleetaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base directory(ies) scanned for repositories
    ///
    /// Repeatable. Defaults to the REPO_BASE environment variable, then
    /// to the config file, then to "repos".
    #[arg(long, value_name = "DIR", env = "REPO_BASE", value_delimiter = ',')]
    pub base: Option<Vec<String>>,

    /// Aggregate JSON output path
    #[arg(short, long, default_value = "data/fleet/aggregate.json", value_name = "FILE")]
    pub out: PathBuf,

    /// Directory for per-repository JSON reports
    #[arg(long, default_value = "data/fleet/per_repo", value_name = "DIR")]
    pub per_repo_dir: PathBuf,

    /// Maximum concurrent repository tasks
    #[arg(long, default_value = "2", env = "MA_CONCURRENCY", value_name = "NUM")]
    pub max_workers: usize,

    /// Maximum source files selected per repository
    #[arg(
        long,
        default_value = "40",
        env = "MA_MAX_FILES_PER_REPO",
        value_name = "COUNT"
    )]
    pub max_files: usize,

    /// Maximum excerpts extracted per selected file
    #[arg(
        long,
        default_value = "1",
        env = "MA_SNIPPETS_PER_AGENT",
        value_name = "COUNT"
    )]
    pub snippets_per_file: usize,

    /// Byte cap per excerpt
    #[arg(
        long,
        default_value = "3000",
        env = "MA_MAX_SNIPPET_BYTES",
        value_name = "BYTES"
    )]
    pub max_snippet_bytes: usize,

    /// Maximum external agent calls per repository
    #[arg(
        long,
        default_value = "120",
        env = "MA_MAX_CALLS_PER_REPO",
        value_name = "COUNT"
    )]
    pub max_calls: u64,

    /// Cap on the path listing handed to path-shaped agents
    #[arg(
        long,
        default_value = "400",
        env = "MA_MAX_PATHS_PER_AGENT",
        value_name = "COUNT"
    )]
    pub max_paths_per_agent: usize,

    /// Model identifier passed to LLM-backed agents
    #[arg(short, long, default_value = "llama3.2:latest", env = "MICRO_AGENT_MODEL")]
    pub model: String,

    /// Provider chat endpoint base URL
    #[arg(
        long,
        default_value = "http://localhost:11434",
        env = "MICRO_AGENT_ENDPOINT",
        value_name = "URL"
    )]
    pub endpoint_url: String,

    /// Provider API credential, forwarded to LLM-backed agents only
    #[arg(long, env = "MICRO_AGENT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fleetaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also render a markdown fleet summary next to the aggregate JSON
    #[arg(long)]
    pub summary: bool,

    /// Dry run: discover repositories and select files without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .fleetaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.max_workers == 0 {
            return Err("Max workers must be at least 1".to_string());
        }

        if self.max_files == 0 {
            return Err("Max files must be at least 1".to_string());
        }

        if self.snippets_per_file == 0 {
            return Err("Snippets per file must be at least 1".to_string());
        }

        if self.max_snippet_bytes == 0 {
            return Err("Max snippet bytes must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        if !self.dry_run
            && !self.endpoint_url.starts_with("http://")
            && !self.endpoint_url.starts_with("https://")
        {
            return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
