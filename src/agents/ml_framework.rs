//! ML framework and pipeline detection agent.
//!
//! One LLM call per snippet. Framework usage is summed per file so the
//! fleet report can distinguish "one import" from "everywhere"; tooling
//! flags are ORed across files; train/eval script counts are summed.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{add_count, finish_sweep, or_bool, snippet_block, sweep_snippets, Agent};
use crate::budget::BudgetTracker;
use crate::llm::LlmClient;
use crate::models::{AgentError, AgentResult, Repository, Snippet};

const SYSTEM_PROMPT: &str = "You are an ML tooling analyst. Detect machine-learning \
frameworks, experiment tracking, and training/evaluation code. Respond ONLY with JSON.";

/// Per-file usage counts, summed across snippets.
const COUNT_KEYS: &[&str] = &[
    "framework_torch",
    "framework_tensorflow",
    "framework_sklearn",
    "framework_keras",
    "framework_xgboost",
    "framework_lightgbm",
    "train_script_count",
    "eval_script_count",
];

/// Repository-level flags, ORed across snippets.
const BOOL_KEYS: &[&str] = &[
    "uses_mlflow",
    "uses_wandb",
    "uses_optuna",
    "uses_ray_tune",
    "has_hyperparam_file",
    "has_entrypoint_training",
    "uses_metrics_library",
    "uses_great_expectations",
    "uses_pandera",
];

pub struct MlFrameworkAgent {
    client: Arc<LlmClient>,
}

impl MlFrameworkAgent {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

fn prompt_for(snippet: &Snippet) -> String {
    format!(
        "Inspect the following code excerpt for ML frameworks and pipeline tooling. \
         Return JSON with integer keys {} (1 when the file uses the framework, else 0, \
         and script counts) and boolean keys {}.\n\n{}",
        COUNT_KEYS.join(", "),
        BOOL_KEYS.join(", "),
        snippet_block(snippet)
    )
}

#[async_trait]
impl Agent for MlFrameworkAgent {
    fn name(&self) -> &'static str {
        "ml_framework"
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
                for key in COUNT_KEYS {
                    add_count(&mut signals, key, parsed);
                }
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
    fn test_prompt_lists_all_keys() {
        let prompt = prompt_for(&Snippet {
            path: "train.py".to_string(),
            text: "import torch".to_string(),
        });
        for key in COUNT_KEYS.iter().chain(BOOL_KEYS) {
            assert!(prompt.contains(key), "prompt missing key {key}");
        }
        assert!(prompt.contains("import torch"));
    }

    #[test]
    fn test_key_sets_are_disjoint() {
        for key in COUNT_KEYS {
            assert!(!BOOL_KEYS.contains(key));
        }
    }
}
