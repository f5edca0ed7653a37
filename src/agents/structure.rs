//! Project structure agent.
//!
//! Static, budget-free: inspects the repository's capped path listing for
//! tests, CI workflows, environment manifests, deployment manifests, and
//! experiment directories. Needs no snippets and makes no external calls.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use super::Agent;
use crate::budget::BudgetTracker;
use crate::models::{AgentError, AgentResult, Repository, Snippet};
use crate::selector::FileSelector;

const CI_MARKERS: &[&str] = &[
    ".github/workflows",
    ".gitlab-ci",
    "jenkinsfile",
    ".circleci",
    "azure-pipelines",
];

const ENV_MARKERS: &[&str] = &[
    "requirements",
    "pipfile",
    "environment.yml",
    "environment.yaml",
    "pyproject.toml",
    "setup.py",
    "cargo.toml",
    "package.json",
];

const DEPLOY_MARKERS: &[&str] = &[
    "dockerfile",
    "docker-compose",
    "k8s",
    "kubernetes",
    "helm",
    "deployment.yaml",
    "service.yaml",
    "deploy",
];

pub struct ProjectStructureAgent {
    selector: FileSelector,
}

impl ProjectStructureAgent {
    pub fn new(selector: FileSelector) -> Self {
        Self { selector }
    }
}

fn count_matching(paths: &[String], markers: &[&str]) -> u64 {
    paths
        .iter()
        .filter(|p| {
            let lower = p.to_lowercase();
            markers.iter().any(|m| lower.contains(m))
        })
        .count() as u64
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.contains("test") || lower.contains("spec.")
}

fn is_experiment_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.contains("experiment") || lower.contains("/exp/") || lower.starts_with("exp/")
}

#[async_trait]
impl Agent for ProjectStructureAgent {
    fn name(&self) -> &'static str {
        "project_structure"
    }

    async fn analyze(
        &self,
        repo: &Repository,
        _snippets: &[Snippet],
        _budget: &BudgetTracker,
    ) -> Result<AgentResult, AgentError> {
        let paths = self.selector.all_paths(repo);

        let test_file_count = paths.iter().filter(|p| is_test_path(p)).count() as u64;
        let ci_workflow_count = count_matching(&paths, CI_MARKERS);
        let env_manifest_count = count_matching(&paths, ENV_MARKERS);
        let deploy_script_count = count_matching(&paths, DEPLOY_MARKERS);
        let experiment_entry_count = paths.iter().filter(|p| is_experiment_path(p)).count() as u64;

        let mut signals = BTreeMap::new();
        signals.insert("test_file_count".to_string(), Value::from(test_file_count));
        signals.insert("has_tests".to_string(), Value::Bool(test_file_count > 0));
        signals.insert("ci_workflow_count".to_string(), Value::from(ci_workflow_count));
        signals.insert("has_ci".to_string(), Value::Bool(ci_workflow_count > 0));
        signals.insert(
            "env_manifest_count".to_string(),
            Value::from(env_manifest_count),
        );
        signals.insert(
            "has_env_manifest".to_string(),
            Value::Bool(env_manifest_count > 0),
        );
        signals.insert(
            "deploy_script_count".to_string(),
            Value::from(deploy_script_count),
        );
        signals.insert(
            "has_deploy_scripts".to_string(),
            Value::Bool(deploy_script_count > 0),
        );
        signals.insert(
            "experiment_entry_count".to_string(),
            Value::from(experiment_entry_count),
        );
        signals.insert(
            "has_experiments".to_string(),
            Value::Bool(experiment_entry_count > 0),
        );
        signals.insert("paths_examined".to_string(), Value::from(paths.len() as u64));

        Ok(AgentResult::complete(self.name(), signals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetCeilings, BudgetTracker};
    use crate::config::SelectorConfig;
    use crate::models::SourceTag;
    use tempfile::TempDir;

    fn repo_at(dir: &TempDir) -> Repository {
        Repository {
            name: "fixture".to_string(),
            path: dir.path().to_path_buf(),
            source: SourceTag::GitHub,
            file_count: 0,
        }
    }

    fn zero_budget() -> BudgetTracker {
        BudgetTracker::new(BudgetCeilings {
            max_calls: 0,
            max_bytes: 0,
            max_files: 0,
        })
    }

    #[tokio::test]
    async fn test_detects_tests_ci_and_manifests() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join(".github/workflows/ci.yml"), "on: push").unwrap();
        std::fs::write(dir.path().join("tests/test_app.py"), "def test(): pass").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "torch\n").unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.11\n").unwrap();

        let agent = ProjectStructureAgent::new(FileSelector::new(SelectorConfig::default()));
        // A zero budget must not matter: the agent makes no external calls.
        let result = agent
            .analyze(&repo_at(&dir), &[], &zero_budget())
            .await
            .unwrap();

        assert_eq!(result.signals["has_tests"], true);
        assert_eq!(result.signals["has_ci"], true);
        assert_eq!(result.signals["has_env_manifest"], true);
        assert_eq!(result.signals["has_deploy_scripts"], true);
        assert_eq!(result.signals["has_experiments"], false);
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_empty_repo_has_nothing() {
        let dir = TempDir::new().unwrap();
        let agent = ProjectStructureAgent::new(FileSelector::new(SelectorConfig::default()));
        let result = agent
            .analyze(&repo_at(&dir), &[], &zero_budget())
            .await
            .unwrap();

        assert_eq!(result.signals["has_tests"], false);
        assert_eq!(result.signals["paths_examined"], 0);
    }

    #[test]
    fn test_experiment_path_matching() {
        assert!(is_experiment_path("experiments/run1/config.yaml"));
        assert!(is_experiment_path("ml/exp/sweep.py"));
        assert!(!is_experiment_path("src/main.py"));
    }
}
