//! Code-quality agent.
//!
//! One LLM call per snippet; numeric quality metrics are averaged across
//! snippets and nested-loop findings are counted per file, matching how
//! the per-file evaluations are folded into repository-level signals.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{finish_sweep, snippet_block, sweep_snippets, Agent};
use crate::budget::BudgetTracker;
use crate::llm::LlmClient;
use crate::models::{AgentError, AgentResult, Repository, Snippet};

const SYSTEM_PROMPT: &str = "You are a strict code-quality analyst. Estimate complexity, \
maintainability, and documentation coverage from code. Respond ONLY with JSON.";

pub struct CodeQualityAgent {
    client: Arc<LlmClient>,
}

impl CodeQualityAgent {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

fn prompt_for(snippet: &Snippet) -> String {
    format!(
        "Analyze the following code excerpt. Return JSON with keys:\n\
         - avg_complexity: number (estimated cyclomatic complexity)\n\
         - maintainability_score: number in [0,1]\n\
         - docstring_coverage: number in [0,1]\n\
         - max_nesting_depth: integer (deepest loop nesting)\n\n\
         {}",
        snippet_block(snippet)
    )
}

#[async_trait]
impl Agent for CodeQualityAgent {
    fn name(&self) -> &'static str {
        "code_quality"
    }

    async fn analyze(
        &self,
        _repo: &Repository,
        snippets: &[Snippet],
        budget: &BudgetTracker,
    ) -> Result<AgentResult, AgentError> {
        if snippets.is_empty() {
            return Ok(AgentResult::no_data(self.name()));
        }

        let mut sum_complexity = 0.0f64;
        let mut sum_maintainability = 0.0f64;
        let mut sum_docstring = 0.0f64;
        let mut nested_loop_files = 0u64;

        let outcome = sweep_snippets(
            self.name(),
            &self.client,
            SYSTEM_PROMPT,
            snippets,
            budget,
            prompt_for,
            |parsed| {
                sum_complexity += parsed
                    .get("avg_complexity")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                sum_maintainability += parsed
                    .get("maintainability_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                sum_docstring += parsed
                    .get("docstring_coverage")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                if parsed
                    .get("max_nesting_depth")
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    > 1
                {
                    nested_loop_files += 1;
                }
            },
        )
        .await?;

        let n = outcome.analyzed.max(1) as f64;
        let mut signals = BTreeMap::new();
        signals.insert(
            "avg_cyclomatic_complexity".to_string(),
            Value::from(sum_complexity / n),
        );
        signals.insert(
            "avg_maintainability_index".to_string(),
            Value::from(sum_maintainability / n),
        );
        signals.insert(
            "docstring_coverage".to_string(),
            Value::from(sum_docstring / n),
        );
        signals.insert("nested_loop_files".to_string(), Value::from(nested_loop_files));

        Ok(finish_sweep(self.name(), signals, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetCeilings, ReserveRequest};
    use crate::config::ModelConfig;
    use crate::models::{AgentErrorKind, SourceTag};
    use std::path::PathBuf;

    fn repo() -> Repository {
        Repository {
            name: "fixture".to_string(),
            path: PathBuf::from("/tmp/fixture"),
            source: SourceTag::GitHub,
            file_count: 1,
        }
    }

    fn agent() -> CodeQualityAgent {
        CodeQualityAgent::new(Arc::new(LlmClient::new(ModelConfig::default()).unwrap()))
    }

    fn tracker(max_calls: u64) -> BudgetTracker {
        BudgetTracker::new(BudgetCeilings {
            max_calls,
            max_bytes: 1_000_000,
            max_files: 100,
        })
    }

    #[tokio::test]
    async fn test_empty_input_reports_no_data() {
        let result = agent().analyze(&repo(), &[], &tracker(10)).await.unwrap();
        assert_eq!(result.signals["no_data"], true);
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_denied_before_first_call_is_budget_error() {
        let budget = tracker(1);
        // Exhaust the call ceiling before the agent runs.
        assert!(budget.try_reserve(ReserveRequest::call(1)).is_granted());

        let snippets = vec![Snippet {
            path: "a.py".to_string(),
            text: "x = 1".to_string(),
        }];
        let err = agent()
            .analyze(&repo(), &snippets, &budget)
            .await
            .unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::BudgetExceeded);
    }

    #[test]
    fn test_prompt_includes_snippet() {
        let prompt = prompt_for(&Snippet {
            path: "src/main.py".to_string(),
            text: "for i in range(3): pass".to_string(),
        });
        assert!(prompt.contains("avg_complexity"));
        assert!(prompt.contains("src/main.py"));
        assert!(prompt.contains("for i in range(3)"));
    }
}
