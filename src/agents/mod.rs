//! Analysis agents.
//!
//! An agent is anything implementing [`Agent`]: it gets a repository, the
//! shared snippet selection, and the repository's budget tracker, and
//! returns a structured result or a typed error. The orchestrator never
//! interprets the signals an agent computes.
//!
//! The registered set is fixed at startup; see [`registry`].

pub mod code_quality;
pub mod infrastructure;
pub mod ml_framework;
pub mod structure;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::budget::{BudgetTracker, ReserveRequest, Reservation};
use crate::config::Config;
use crate::llm::{parse_json_response, LlmClient};
use crate::models::{AgentError, AgentResult, Repository, Snippet};
use crate::selector::FileSelector;

pub use code_quality::CodeQualityAgent;
pub use infrastructure::InfrastructureAgent;
pub use ml_framework::MlFrameworkAgent;
pub use structure::ProjectStructureAgent;

/// A pluggable analysis strategy.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent identifier used in reports.
    fn name(&self) -> &'static str;

    /// Analyze one repository from its snippet selection.
    ///
    /// Agents that do external work must reserve budget before each unit of
    /// it and degrade to a partial result when a reservation is denied.
    async fn analyze(
        &self,
        repo: &Repository,
        snippets: &[Snippet],
        budget: &BudgetTracker,
    ) -> Result<AgentResult, AgentError>;
}

/// The agent set for one run, in fixed registration order.
pub fn registry(config: &Config, client: Arc<LlmClient>) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(CodeQualityAgent::new(Arc::clone(&client))),
        Box::new(MlFrameworkAgent::new(Arc::clone(&client))),
        Box::new(InfrastructureAgent::new(client)),
        Box::new(ProjectStructureAgent::new(FileSelector::new(
            config.selector.clone(),
        ))),
    ]
}

/// What a snippet sweep consumed and produced.
pub(crate) struct SweepOutcome {
    pub analyzed: u64,
    pub malformed: u64,
    pub partial: bool,
    pub last_raw: Option<String>,
}

/// Run one budget-gated LLM call per snippet, feeding each parsed reply to
/// `accumulate`.
///
/// Budget handling follows the degradation contract: a denial before any
/// successful call is a budget-exceeded error; a denial after at least one
/// call ends the sweep with `partial` set. Transport failures that survive
/// the client's bounded retries become call-failed errors. Replies that
/// parse to nothing are counted; a sweep where every reply was unparseable
/// is a malformed-response error.
pub(crate) async fn sweep_snippets<F>(
    agent: &'static str,
    client: &LlmClient,
    system_prompt: &str,
    snippets: &[Snippet],
    budget: &BudgetTracker,
    prompt: impl Fn(&Snippet) -> String,
    mut accumulate: F,
) -> Result<SweepOutcome, AgentError>
where
    F: FnMut(&Value),
{
    let mut outcome = SweepOutcome {
        analyzed: 0,
        malformed: 0,
        partial: false,
        last_raw: None,
    };

    for snippet in snippets {
        let payload = prompt(snippet);

        match budget.try_reserve(ReserveRequest::call(payload.len() as u64)) {
            Reservation::Granted => {}
            Reservation::Denied(reason) => {
                if outcome.analyzed == 0 && outcome.malformed == 0 {
                    return Err(AgentError::budget_exceeded(agent, reason.to_string()));
                }
                outcome.partial = true;
                break;
            }
        }

        let raw = client
            .chat(system_prompt, &payload)
            .await
            .map_err(|e| AgentError::call_failed(agent, e.to_string()))?;

        match parse_json_response(&raw) {
            Some(parsed) => {
                accumulate(&parsed);
                outcome.analyzed += 1;
                outcome.last_raw = Some(raw);
            }
            None => outcome.malformed += 1,
        }
    }

    if outcome.analyzed == 0 && outcome.malformed > 0 {
        return Err(AgentError::malformed(
            agent,
            format!("{} unparseable replies, none parseable", outcome.malformed),
        ));
    }

    Ok(outcome)
}

/// Finish a sweep into an [`AgentResult`], attaching bookkeeping signals.
pub(crate) fn finish_sweep(
    agent: &str,
    mut signals: BTreeMap<String, Value>,
    outcome: SweepOutcome,
) -> AgentResult {
    signals.insert("snippets_analyzed".to_string(), Value::from(outcome.analyzed));
    if outcome.malformed > 0 {
        signals.insert(
            "malformed_responses".to_string(),
            Value::from(outcome.malformed),
        );
    }

    let mut result = AgentResult::complete(agent, signals);
    result.raw_response = outcome.last_raw;
    if outcome.partial {
        result = result.into_partial();
    }
    result
}

/// OR a boolean signal with the matching key of a parsed reply.
pub(crate) fn or_bool(signals: &mut BTreeMap<String, Value>, key: &str, parsed: &Value) {
    let incoming = parsed.get(key).and_then(Value::as_bool).unwrap_or(false);
    let current = signals.get(key).and_then(Value::as_bool).unwrap_or(false);
    signals.insert(key.to_string(), Value::Bool(current || incoming));
}

/// Sum a count signal with the matching key of a parsed reply.
pub(crate) fn add_count(signals: &mut BTreeMap<String, Value>, key: &str, parsed: &Value) {
    let incoming = parsed.get(key).and_then(Value::as_u64).unwrap_or(0);
    let current = signals.get(key).and_then(Value::as_u64).unwrap_or(0);
    signals.insert(key.to_string(), Value::from(current + incoming));
}

/// Label snippets the way prompts reference them.
pub(crate) fn snippet_block(snippet: &Snippet) -> String {
    format!("--- File {} ---\n{}", snippet.path, snippet.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_or_bool_accumulates() {
        let mut signals = BTreeMap::new();
        or_bool(&mut signals, "uses_mlflow", &json!({"uses_mlflow": false}));
        assert_eq!(signals["uses_mlflow"], false);

        or_bool(&mut signals, "uses_mlflow", &json!({"uses_mlflow": true}));
        assert_eq!(signals["uses_mlflow"], true);

        // Once true, stays true.
        or_bool(&mut signals, "uses_mlflow", &json!({"uses_mlflow": false}));
        assert_eq!(signals["uses_mlflow"], true);

        // Missing key counts as false.
        or_bool(&mut signals, "uses_wandb", &json!({}));
        assert_eq!(signals["uses_wandb"], false);
    }

    #[test]
    fn test_add_count_accumulates() {
        let mut signals = BTreeMap::new();
        add_count(&mut signals, "train_script_count", &json!({"train_script_count": 2}));
        add_count(&mut signals, "train_script_count", &json!({"train_script_count": 1}));
        add_count(&mut signals, "train_script_count", &json!({}));
        assert_eq!(signals["train_script_count"], 3);
    }

    #[test]
    fn test_snippet_block_labels_path() {
        let snippet = Snippet {
            path: "src/train.py".to_string(),
            text: "def train(): pass".to_string(),
        };
        let block = snippet_block(&snippet);
        assert!(block.starts_with("--- File src/train.py ---"));
        assert!(block.contains("def train"));
    }

    #[test]
    fn test_finish_sweep_bookkeeping() {
        let outcome = SweepOutcome {
            analyzed: 3,
            malformed: 1,
            partial: true,
            last_raw: Some("{}".to_string()),
        };
        let result = finish_sweep("ml_framework", BTreeMap::new(), outcome);
        assert!(result.partial);
        assert_eq!(result.signals["snippets_analyzed"], 3);
        assert_eq!(result.signals["malformed_responses"], 1);
        assert_eq!(result.raw_response.as_deref(), Some("{}"));
    }
}
