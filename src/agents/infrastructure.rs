//! Infrastructure detection agent.
//!
//! One LLM call per snippet; serving, pipeline, concurrency, and
//! secret-exposure flags are ORed across files.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{finish_sweep, or_bool, snippet_block, sweep_snippets, Agent};
use crate::budget::BudgetTracker;
use crate::llm::LlmClient;
use crate::models::{AgentError, AgentResult, Repository, Snippet};

const SYSTEM_PROMPT: &str = "You are an infrastructure analyst. Detect serving \
frameworks, pipeline orchestrators, concurrency primitives, model export code, and \
hardcoded secrets. Respond ONLY with JSON of booleans.";

const BOOL_KEYS: &[&str] = &[
    "uses_threading",
    "uses_multiprocessing",
    "uses_fastapi",
    "uses_flask",
    "uses_streamlit",
    "exports_model",
    "has_airflow",
    "has_prefect",
    "has_kedro",
    "uses_feature_engineering",
    "has_secrets",
];

pub struct InfrastructureAgent {
    client: Arc<LlmClient>,
}

impl InfrastructureAgent {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

fn prompt_for(snippet: &Snippet) -> String {
    format!(
        "Inspect the following code excerpt. Return JSON with boolean keys {}.\n\n{}",
        BOOL_KEYS.join(", "),
        snippet_block(snippet)
    )
}

#[async_trait]
impl Agent for InfrastructureAgent {
    fn name(&self) -> &'static str {
        "infrastructure"
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

        let mut signals = BTreeMap::new();

        let outcome = sweep_snippets(
            self.name(),
            &self.client,
            SYSTEM_PROMPT,
            snippets,
            budget,
            prompt_for,
            |parsed| {
                for key in BOOL_KEYS {
                    or_bool(&mut signals, key, parsed);
                }
            },
        )
        .await?;

        Ok(finish_sweep(self.name(), signals, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_all_flags() {
        let prompt = prompt_for(&Snippet {
            path: "app.py".to_string(),
            text: "from fastapi import FastAPI".to_string(),
        });
        for key in BOOL_KEYS {
            assert!(prompt.contains(key), "prompt missing key {key}");
        }
    }
}
