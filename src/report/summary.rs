//! Markdown fleet summary.
//!
//! A human-readable rendering of the aggregate report: run metadata, a
//! per-repository status table, and the failures that need attention.

use crate::models::{AgentOutcome, AggregateReport};

/// Render the aggregate report as Markdown.
pub fn generate_markdown_summary(aggregate: &AggregateReport) -> String {
    let mut output = String::new();

    output.push_str("# FleetAudit Summary\n\n");
    output.push_str(&generate_metadata_section(aggregate));
    output.push_str(&generate_status_table(aggregate));
    output.push_str(&generate_failures_section(aggregate));

    output
}

fn generate_metadata_section(aggregate: &AggregateReport) -> String {
    let summary = &aggregate.summary;
    let mut section = String::new();

    section.push_str("## Run\n\n");
    section.push_str(&format!(
        "- **Started:** {}\n",
        aggregate.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Repositories:** {}\n",
        summary.total_repositories
    ));
    section.push_str(&format!("- **Complete:** {}\n", summary.complete));
    section.push_str(&format!(
        "- **Partially failed:** {}\n",
        summary.partially_failed
    ));
    section.push_str(&format!("- **Failed:** {}\n", summary.failed));
    section.push('\n');

    section
}

fn generate_status_table(aggregate: &AggregateReport) -> String {
    let mut section = String::new();

    section.push_str("## Repositories\n\n");
    if aggregate.reports.is_empty() {
        section.push_str("No repositories were analyzed.\n\n");
        return section;
    }

    section.push_str("| Repository | Source | Status | Agents OK | Agents failed |\n");
    section.push_str("|---|---|---|---|---|\n");

    for report in aggregate.reports.values() {
        let failed = report.outcomes.iter().filter(|o| o.is_error()).count();
        let ok = report.outcomes.len() - failed;
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            report.repository, report.source, report.status, ok, failed
        ));
    }
    section.push('\n');

    section
}

fn generate_failures_section(aggregate: &AggregateReport) -> String {
    let mut failures = Vec::new();

    for report in aggregate.reports.values() {
        for outcome in &report.outcomes {
            if let AgentOutcome::Error(err) = outcome {
                failures.push(format!(
                    "- `{}` / `{}`: {} ({})",
                    report.repository, err.agent, err.message, err.kind
                ));
            }
        }
    }

    if failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Failures\n\n");
    for line in failures {
        section.push_str(&line);
        section.push('\n');
    }
    section.push('\n');

    section
}
