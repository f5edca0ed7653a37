//! Data models for the fleet assessor.
//!
//! This module contains the core data structures shared by discovery,
//! selection, budgeting, the agents, and the report pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Hosting namespace a repository was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Discovered under a GitHub-sourced base directory.
    GitHub,
    /// Discovered under a GitLab-sourced base directory.
    GitLab,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTag::GitHub => write!(f, "github"),
            SourceTag::GitLab => write!(f, "gitlab"),
        }
    }
}

/// A repository discovered for one run. Immutable once discovered.
#[derive(Debug, Clone)]
pub struct Repository {
    /// Identifier: the repository's directory name.
    pub name: String,
    /// Absolute path to the repository root.
    pub path: PathBuf,
    /// Which namespace the repository came from.
    pub source: SourceTag,
    /// Number of files found at discovery time (excluding VCS metadata).
    pub file_count: usize,
}

/// A ranked source file produced by the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path relative to the repository root.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// File extension (without dot).
    pub extension: String,
}

/// A byte-capped excerpt of a selected file.
///
/// The excerpt text is a pure function of the file content and the
/// configured cap, so two selections over the same repository snapshot
/// yield identical snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Path of the file the excerpt came from, relative to the repo root.
    pub path: String,
    /// The excerpt itself, at most the configured cap in bytes.
    pub text: String,
}

/// Structured output of one agent for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Name of the agent that produced the result.
    pub agent: String,
    /// Signal map; `BTreeMap` keeps persisted output stable across runs.
    pub signals: BTreeMap<String, Value>,
    /// Last raw provider response, kept for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// True when a budget denial interrupted the agent mid-run.
    pub partial: bool,
}

impl AgentResult {
    /// A complete result with the given signals.
    pub fn complete(agent: &str, signals: BTreeMap<String, Value>) -> Self {
        Self {
            agent: agent.to_string(),
            signals,
            raw_response: None,
            partial: false,
        }
    }

    /// The "no data" result agents return for empty snippet input.
    pub fn no_data(agent: &str) -> Self {
        let mut signals = BTreeMap::new();
        signals.insert("no_data".to_string(), Value::Bool(true));
        Self::complete(agent, signals)
    }

    /// Mark the result as interrupted by a budget denial.
    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

/// What went wrong inside a single agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// A reservation was denied before the agent did any work.
    BudgetExceeded,
    /// The external call failed after retries were exhausted.
    CallFailed,
    /// The provider answered, but nothing parseable came back.
    MalformedResponse,
    /// The run was cancelled before this agent could record an outcome.
    Cancelled,
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentErrorKind::BudgetExceeded => write!(f, "budget exceeded"),
            AgentErrorKind::CallFailed => write!(f, "call failed"),
            AgentErrorKind::MalformedResponse => write!(f, "malformed response"),
            AgentErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A typed, per-agent failure. Never escalates past the agent's entry.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{agent}: {kind}: {message}")]
pub struct AgentError {
    /// Name of the agent that failed.
    pub agent: String,
    /// Failure classification.
    pub kind: AgentErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl AgentError {
    pub fn budget_exceeded(agent: &str, message: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            kind: AgentErrorKind::BudgetExceeded,
            message: message.into(),
        }
    }

    pub fn call_failed(agent: &str, message: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            kind: AgentErrorKind::CallFailed,
            message: message.into(),
        }
    }

    pub fn malformed(agent: &str, message: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            kind: AgentErrorKind::MalformedResponse,
            message: message.into(),
        }
    }

    pub fn cancelled(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            kind: AgentErrorKind::Cancelled,
            message: "run cancelled before the agent recorded an outcome".to_string(),
        }
    }
}

/// One entry of a repository report: result or error, exactly one per
/// registered agent, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AgentOutcome {
    Result(AgentResult),
    Error(AgentError),
}

impl AgentOutcome {
    /// Name of the agent this outcome belongs to.
    #[allow(dead_code)] // Utility accessor
    pub fn agent(&self) -> &str {
        match self {
            AgentOutcome::Result(r) => &r.agent,
            AgentOutcome::Error(e) => &e.agent,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentOutcome::Error(_))
    }
}

impl From<Result<AgentResult, AgentError>> for AgentOutcome {
    fn from(res: Result<AgentResult, AgentError>) -> Self {
        match res {
            Ok(r) => AgentOutcome::Result(r),
            Err(e) => AgentOutcome::Error(e),
        }
    }
}

/// Overall status of one repository's analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    /// Every registered agent produced a result.
    Complete,
    /// At least one agent entry is an error; the pass still finished.
    PartiallyFailed,
    /// A fatal condition or cancellation ended the pass early.
    Failed,
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoStatus::Complete => write!(f, "complete"),
            RepoStatus::PartiallyFailed => write!(f, "partially_failed"),
            RepoStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The per-repository report: one outcome per registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoReport {
    /// Repository identifier (directory name).
    pub repository: String,
    /// Namespace the repository came from.
    pub source: SourceTag,
    /// When the analysis pass finished.
    pub analyzed_at: DateTime<Utc>,
    /// Overall status of the pass.
    pub status: RepoStatus,
    /// Agent outcomes in registration order.
    pub outcomes: Vec<AgentOutcome>,
}

impl RepoReport {
    /// Build a report from a finished pass, deriving the status from the
    /// outcomes: any error entry downgrades Complete to PartiallyFailed.
    pub fn from_outcomes(repo: &Repository, outcomes: Vec<AgentOutcome>) -> Self {
        let status = if outcomes.iter().any(AgentOutcome::is_error) {
            RepoStatus::PartiallyFailed
        } else {
            RepoStatus::Complete
        };
        Self {
            repository: repo.name.clone(),
            source: repo.source,
            analyzed_at: Utc::now(),
            status,
            outcomes,
        }
    }

    /// Build a failed report, e.g. for a repository that vanished after
    /// discovery or a run that was cancelled mid-flight.
    pub fn failed(repo: &Repository, outcomes: Vec<AgentOutcome>) -> Self {
        Self {
            repository: repo.name.clone(),
            source: repo.source,
            analyzed_at: Utc::now(),
            status: RepoStatus::Failed,
            outcomes,
        }
    }
}

/// Run-level counters shown in the aggregate report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Repositories planned for this run.
    pub total_repositories: usize,
    pub complete: usize,
    pub partially_failed: usize,
    pub failed: usize,
}

/// The fleet-wide report: one entry per repository identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Run-level counters, recomputed on every merge.
    pub summary: RunSummary,
    /// Per-repository reports keyed by identifier; re-running a repository
    /// overwrites its entry.
    pub reports: BTreeMap<String, RepoReport>,
}

impl AggregateReport {
    /// An empty aggregate for a run over `total` repositories.
    pub fn new(started_at: DateTime<Utc>, total: usize) -> Self {
        Self {
            started_at,
            summary: RunSummary {
                total_repositories: total,
                ..RunSummary::default()
            },
            reports: BTreeMap::new(),
        }
    }
}
