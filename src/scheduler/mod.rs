//! Concurrency scheduler.
//!
//! Runs repository analysis tasks across a bounded worker pool. Each task
//! selects snippets once, runs every registered agent in registration
//! order against one shared budget tracker, and folds the outcomes into a
//! per-repository report. Agent failures stay inside their entry; only a
//! fatal condition (repository vanished, run cancelled) fails a task.
//!
//! No ordering is guaranteed across repositories. Within a repository the
//! outcome order is the registration order, so report shapes are stable
//! across runs regardless of completion order.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indicatif::ProgressBar;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::agents::Agent;
use crate::analysis;
use crate::budget::{BudgetCeilings, BudgetTracker, ReserveRequest};
use crate::config::Config;
use crate::models::{AgentError, AgentOutcome, AggregateReport, RepoReport, Repository};
use crate::report::ReportWriter;
use crate::selector::FileSelector;

/// Lifecycle of one repository task, logged for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Selecting,
    Analyzing,
    Aggregating,
    Done,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Selecting => "selecting",
            TaskState::Analyzing => "analyzing",
            TaskState::Aggregating => "aggregating",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Bounded-pool scheduler over the discovered repositories.
pub struct ConcurrencyScheduler {
    config: Arc<Config>,
    agents: Vec<Box<dyn Agent>>,
    selector: FileSelector,
    writer: ReportWriter,
    progress: Option<ProgressBar>,
}

impl ConcurrencyScheduler {
    pub fn new(config: Arc<Config>, agents: Vec<Box<dyn Agent>>, writer: ReportWriter) -> Self {
        let selector = FileSelector::new(config.selector.clone());
        Self {
            config,
            agents,
            selector,
            writer,
            progress: None,
        }
    }

    /// Attach a fleet progress bar, advanced once per finished repository.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the fleet. The stop signal prevents new repository tasks from
    /// starting and bounds in-flight work by the configured grace period;
    /// repositories that did not complete are recorded as failed, never
    /// dropped.
    pub async fn run(
        &self,
        repositories: Vec<Repository>,
        stop: watch::Receiver<bool>,
    ) -> AggregateReport {
        let total = repositories.len();
        let workers = self.config.scheduler.max_concurrency.max(1);
        info!(
            "Scheduling {} repositories across {} workers ({} agents each)",
            total,
            workers,
            self.agents.len()
        );

        let mut aggregate = AggregateReport::new(Utc::now(), total);

        let mut results = stream::iter(repositories.into_iter().map(|repo| {
            let stop = stop.clone();
            async move { self.run_repository(repo, stop).await }
        }))
        .buffer_unordered(workers);

        while let Some(report) = results.next().await {
            // A failed artifact write is fatal for the file only; the
            // repository still counts toward the in-memory aggregate.
            if let Err(e) = self.writer.write_per_repo(&report) {
                error!("Per-repo report not persisted: {}", e);
            }
            analysis::merge(&mut aggregate, report);
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        aggregate
    }

    async fn run_repository(&self, repo: Repository, stop: watch::Receiver<bool>) -> RepoReport {
        let mut state = TaskState::Pending;

        if *stop.borrow() {
            debug!("Not starting {}: stop signal already set", repo.name);
            self.transition(&repo, &mut state, TaskState::Failed);
            return RepoReport::failed(&repo, self.unreached_outcomes(0, Unreached::Cancelled));
        }

        self.transition(&repo, &mut state, TaskState::Selecting);

        // Discovery can race with deletion; that is the one fatal condition.
        if !repo.path.is_dir() {
            warn!("Repository vanished after discovery: {}", repo.path.display());
            self.transition(&repo, &mut state, TaskState::Failed);
            return RepoReport::failed(&repo, self.unreached_outcomes(0, Unreached::Vanished));
        }

        let budget = BudgetTracker::new(BudgetCeilings::from_config(&self.config));
        let snippets = self.selector.select(&repo);

        let mut files = Vec::new();
        for snippet in &snippets {
            if !files.contains(&snippet.path) {
                files.push(snippet.path.clone());
            }
        }
        if !budget
            .try_reserve(ReserveRequest::files(files.len() as u64))
            .is_granted()
        {
            // The selector already enforces the file cap, so this only
            // trips on a misconfigured ceiling.
            warn!("File reservation denied for {}", repo.name);
        }

        self.transition(&repo, &mut state, TaskState::Analyzing);

        let grace = Duration::from_secs(self.config.scheduler.cancel_grace_seconds);
        let mut outcomes = Vec::with_capacity(self.agents.len());
        let mut cancelled = false;

        for (index, agent) in self.agents.iter().enumerate() {
            if cancelled {
                outcomes.extend(self.unreached_outcomes(index, Unreached::Cancelled));
                break;
            }

            let work = AssertUnwindSafe(agent.analyze(&repo, &snippets, &budget)).catch_unwind();

            tokio::select! {
                result = work => {
                    let outcome = match result {
                        Ok(res) => AgentOutcome::from(res),
                        Err(_) => {
                            error!("Agent {} panicked on {}", agent.name(), repo.name);
                            AgentOutcome::Error(AgentError::call_failed(
                                agent.name(),
                                "agent panicked",
                            ))
                        }
                    };
                    outcomes.push(outcome);
                }
                _ = stopped_for(stop.clone(), grace) => {
                    warn!(
                        "Cancelling {} during agent {} after {}s grace",
                        repo.name,
                        agent.name(),
                        grace.as_secs()
                    );
                    outcomes.push(AgentOutcome::Error(AgentError::cancelled(agent.name())));
                    cancelled = true;
                }
            }
        }

        self.transition(&repo, &mut state, TaskState::Aggregating);

        let snapshot = budget.snapshot();
        debug!(
            "Budget for {}: {} calls, {} bytes, {} files",
            repo.name, snapshot.calls_made, snapshot.bytes_sent, snapshot.files_used
        );

        if cancelled {
            self.transition(&repo, &mut state, TaskState::Failed);
            RepoReport::failed(&repo, outcomes)
        } else {
            self.transition(&repo, &mut state, TaskState::Done);
            RepoReport::from_outcomes(&repo, outcomes)
        }
    }

    /// One error outcome per agent from `from` onward, preserving the
    /// one-entry-per-agent report shape for tasks that ended early.
    fn unreached_outcomes(&self, from: usize, why: Unreached) -> Vec<AgentOutcome> {
        self.agents[from..]
            .iter()
            .map(|agent| {
                AgentOutcome::Error(match why {
                    Unreached::Cancelled => AgentError::cancelled(agent.name()),
                    Unreached::Vanished => AgentError::call_failed(
                        agent.name(),
                        "repository unreadable after discovery",
                    ),
                })
            })
            .collect()
    }

    fn transition(&self, repo: &Repository, state: &mut TaskState, next: TaskState) {
        debug!("{}: {} -> {}", repo.name, state, next);
        *state = next;
    }
}

#[derive(Clone, Copy)]
enum Unreached {
    Cancelled,
    Vanished,
}

/// Resolves once a stop signal has been observed and the grace period has
/// elapsed. Never resolves while the run is healthy.
async fn stopped_for(mut stop: watch::Receiver<bool>, grace: Duration) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            // Sender gone without a stop: keep running to completion.
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(grace).await;
}
