//! Mock backend
//!
//! Simulates agent executions with configurable success probability and
//! latency. These semantics are normative: every other backend is tested
//! against the result shapes this one produces.

use crate::adapter::{policy_rejection, AgentAdapter};
use crate::policy::{FileOperation, PolicyEngine};
use async_trait::async_trait;
use chrono::Utc;
use hachiko_core::types::{AgentInput, AgentResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Mock backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockAgentConfig {
    /// Probability of a simulated success
    pub success_rate: f64,
    /// Simulated execution latency
    pub execution_time: Duration,
    /// Whether simulated successes actually touch the input files
    pub modify_files: bool,
}

impl MockAgentConfig {
    /// Default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a success probability.
    #[inline]
    #[must_use]
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// With a simulated latency.
    #[inline]
    #[must_use]
    pub fn with_execution_time(mut self, latency: Duration) -> Self {
        self.execution_time = latency;
        self
    }

    /// With real file modification on simulated success.
    #[inline]
    #[must_use]
    pub fn with_modify_files(mut self, modify: bool) -> Self {
        self.modify_files = modify;
        self
    }
}

impl Default for MockAgentConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.9,
            execution_time: Duration::from_millis(2000),
            modify_files: false,
        }
    }
}

/// Simulated agent backend.
pub struct MockAdapter {
    config: MockAgentConfig,
    policy: PolicyEngine,
}

impl MockAdapter {
    /// Mock adapter over a compiled policy.
    #[must_use]
    pub fn new(config: MockAgentConfig, policy: PolicyEngine) -> Self {
        Self { config, policy }
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    async fn validate(&self) -> bool {
        true
    }

    async fn execute(&self, input: AgentInput) -> AgentResult {
        let started = Instant::now();

        let violations = self
            .policy
            .check(&input.files, &input.repo_path, FileOperation::Write);
        if !violations.is_empty() {
            return policy_rejection(&input, &violations, started);
        }

        tokio::time::sleep(self.config.execution_time).await;

        let roll: f64 = rand::thread_rng().gen();
        if roll >= self.config.success_rate {
            return AgentResult::failure("simulated agent failure", 1, started.elapsed());
        }

        let mut modified_files = Vec::new();
        let mut created_files = Vec::new();
        if self.config.modify_files {
            let stamp = Utc::now().to_rfc3339();
            for file in &input.files {
                let path = input.repo_path.join(file);
                match tokio::fs::read_to_string(&path).await {
                    Ok(mut contents) => {
                        contents.push_str(&format!(
                            "\n// migrated by hachiko mock agent at {stamp}\n"
                        ));
                        if tokio::fs::write(&path, contents).await.is_ok() {
                            modified_files.push(file.clone());
                        }
                    }
                    Err(_) => {
                        if let Some(parent) = path.parent() {
                            let _ = tokio::fs::create_dir_all(parent).await;
                        }
                        let stub =
                            format!("// created by hachiko mock agent at {stamp}\n");
                        if tokio::fs::write(&path, stub).await.is_ok() {
                            created_files.push(file.clone());
                        }
                    }
                }
            }
        }

        AgentResult {
            success: true,
            modified_files,
            created_files,
            deleted_files: Vec::new(),
            output: format!(
                "mock agent completed step '{}' of plan '{}'",
                input.step_id, input.plan_id
            ),
            error: None,
            exit_code: 0,
            execution_time: started.elapsed(),
        }
    }

    fn config_summary(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("backend".to_string(), "mock".to_string()),
            (
                "success_rate".to_string(),
                self.config.success_rate.to_string(),
            ),
            (
                "execution_time_ms".to_string(),
                self.config.execution_time.as_millis().to_string(),
            ),
            (
                "modify_files".to_string(),
                self.config.modify_files.to_string(),
            ),
        ])
    }
}
