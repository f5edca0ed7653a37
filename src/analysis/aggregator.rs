//! Fleet-wide result aggregation.
//!
//! Pure merge of per-repository reports into the running aggregate, keyed
//! by repository identifier with overwrite semantics, plus the run-level
//! summary counters.

use crate::models::{AggregateReport, RepoReport, RepoStatus, RunSummary};

/// Merge one finished repository report into the aggregate.
///
/// Repeated identifiers overwrite rather than duplicate; the summary is
/// recomputed on every merge so observers always see consistent counters.
pub fn merge(aggregate: &mut AggregateReport, report: RepoReport) {
    aggregate.reports.insert(report.repository.clone(), report);
    aggregate.summary = summarize(aggregate);
}

/// Recompute the run-level counters from the merged reports.
pub fn summarize(aggregate: &AggregateReport) -> RunSummary {
    let mut summary = RunSummary {
        total_repositories: aggregate.summary.total_repositories,
        ..RunSummary::default()
    };

    for report in aggregate.reports.values() {
        match report.status {
            RepoStatus::Complete => summary.complete += 1,
            RepoStatus::PartiallyFailed => summary.partially_failed += 1,
            RepoStatus::Failed => summary.failed += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentError, AgentOutcome, AgentResult, Repository, SourceTag};
    use chrono::Utc;
    use std::path::PathBuf;

    fn repo(name: &str) -> Repository {
        Repository {
            name: name.to_string(),
            path: PathBuf::from(format!("/tmp/{name}")),
            source: SourceTag::GitHub,
            file_count: 1,
        }
    }

    fn complete_report(name: &str) -> RepoReport {
        RepoReport::from_outcomes(
            &repo(name),
            vec![AgentOutcome::Result(AgentResult::no_data("a"))],
        )
    }

    fn degraded_report(name: &str) -> RepoReport {
        RepoReport::from_outcomes(
            &repo(name),
            vec![AgentOutcome::Error(AgentError::call_failed("a", "boom"))],
        )
    }

    #[test]
    fn test_merge_counts_statuses() {
        let mut aggregate = AggregateReport::new(Utc::now(), 3);
        merge(&mut aggregate, complete_report("one"));
        merge(&mut aggregate, degraded_report("two"));
        merge(&mut aggregate, RepoReport::failed(&repo("three"), vec![]));

        assert_eq!(aggregate.summary.total_repositories, 3);
        assert_eq!(aggregate.summary.complete, 1);
        assert_eq!(aggregate.summary.partially_failed, 1);
        assert_eq!(aggregate.summary.failed, 1);
    }

    #[test]
    fn test_rerun_overwrites_instead_of_duplicating() {
        let mut aggregate = AggregateReport::new(Utc::now(), 1);
        merge(&mut aggregate, degraded_report("one"));
        assert_eq!(aggregate.summary.partially_failed, 1);

        // Re-running the same repository replaces its entry.
        merge(&mut aggregate, complete_report("one"));
        assert_eq!(aggregate.reports.len(), 1);
        assert_eq!(aggregate.summary.complete, 1);
        assert_eq!(aggregate.summary.partially_failed, 0);
    }

    #[test]
    fn test_reports_iterate_in_identifier_order() {
        let mut aggregate = AggregateReport::new(Utc::now(), 2);
        merge(&mut aggregate, complete_report("zebra"));
        merge(&mut aggregate, complete_report("apple"));

        let keys: Vec<_> = aggregate.reports.keys().cloned().collect();
        assert_eq!(keys, vec!["apple", "zebra"]);
    }
}
