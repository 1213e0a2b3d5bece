//! Cloud agent backends
//!
//! The concrete wire protocols (Codex, Devin) are out of scope here; the
//! adapter owns what every cloud backend must share: policy enforcement
//! before mutation, session timing, outcome normalization, and a
//! secret-free configuration summary. The session itself is delegated to
//! an injected [`CloudBackend`] implementation.

use crate::adapter::{policy_rejection, AgentAdapter};
use crate::error::BackendError;
use crate::policy::{FileOperation, PolicyEngine};
use async_trait::async_trait;
use hachiko_core::types::{AgentInput, AgentResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloud backend configuration. `api_key` never leaves this struct through
/// the config summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAgentConfig {
    /// Provider API endpoint
    pub endpoint: String,
    /// Provider credential
    pub api_key: String,
    /// Model override, when the provider supports one
    pub model: Option<String>,
    /// Upper bound on one cloud session
    pub session_timeout: Duration,
}

impl CloudAgentConfig {
    /// Configuration for an endpoint/credential pair.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: None,
            session_timeout: Duration::from_secs(1800),
        }
    }

    /// With a model override.
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// With a session timeout.
    #[inline]
    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

/// What a cloud session reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSessionOutcome {
    /// Provider's session summary
    pub summary: String,
    /// Files the session modified
    pub modified_files: Vec<String>,
    /// Files the session created
    pub created_files: Vec<String>,
    /// Files the session deleted
    pub deleted_files: Vec<String>,
    /// Provider-reported exit code; 0 on success
    pub exit_code: i32,
}

/// The provider-specific half of a cloud adapter.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// Provider tag ("codex", "devin")
    fn provider(&self) -> &'static str;

    /// Is the provider reachable with the configured credentials?
    async fn ready(&self, config: &CloudAgentConfig) -> bool;

    /// Run one agent session.
    async fn run_session(
        &self,
        input: &AgentInput,
        config: &CloudAgentConfig,
    ) -> Result<CloudSessionOutcome, BackendError>;
}

/// Adapter over any cloud backend.
pub struct CloudAdapter {
    config: CloudAgentConfig,
    policy: PolicyEngine,
    backend: Arc<dyn CloudBackend>,
}

impl CloudAdapter {
    /// Cloud adapter over a compiled policy and an injected backend.
    #[must_use]
    pub fn new(
        config: CloudAgentConfig,
        policy: PolicyEngine,
        backend: Arc<dyn CloudBackend>,
    ) -> Self {
        Self {
            config,
            policy,
            backend,
        }
    }
}

#[async_trait]
impl AgentAdapter for CloudAdapter {
    async fn validate(&self) -> bool {
        !self.config.api_key.is_empty() && self.backend.ready(&self.config).await
    }

    async fn execute(&self, input: AgentInput) -> AgentResult {
        let started = Instant::now();

        let violations = self
            .policy
            .check(&input.files, &input.repo_path, FileOperation::Write);
        if !violations.is_empty() {
            return policy_rejection(&input, &violations, started);
        }

        let session = tokio::time::timeout(
            self.config.session_timeout,
            self.backend.run_session(&input, &self.config),
        )
        .await;

        match session {
            Err(_) => {
                tracing::warn!(
                    "{} session for step '{}' of plan '{}' timed out after {}s",
                    self.backend.provider(),
                    input.step_id,
                    input.plan_id,
                    self.config.session_timeout.as_secs()
                );
                AgentResult::failure(
                    format!(
                        "{} session timed out after {}s",
                        self.backend.provider(),
                        self.config.session_timeout.as_secs()
                    ),
                    -1,
                    started.elapsed(),
                )
            }
            Ok(Err(e)) => {
                tracing::error!(
                    "{} session for step '{}' of plan '{}' failed: {}",
                    self.backend.provider(),
                    input.step_id,
                    input.plan_id,
                    e
                );
                AgentResult::failure(e.to_string(), e.exit_code().unwrap_or(-1), started.elapsed())
            }
            Ok(Ok(outcome)) => {
                let success = outcome.exit_code == 0;
                let error = (!success).then(|| {
                    format!(
                        "{} session exited with code {}",
                        self.backend.provider(),
                        outcome.exit_code
                    )
                });
                AgentResult {
                    success,
                    modified_files: outcome.modified_files,
                    created_files: outcome.created_files,
                    deleted_files: outcome.deleted_files,
                    output: outcome.summary,
                    error,
                    exit_code: outcome.exit_code,
                    execution_time: started.elapsed(),
                }
            }
        }
    }

    fn config_summary(&self) -> BTreeMap<String, String> {
        let mut summary = BTreeMap::from([
            (
                "backend".to_string(),
                format!("cloud-{}", self.backend.provider()),
            ),
            ("endpoint".to_string(), self.config.endpoint.clone()),
            (
                "credentials".to_string(),
                if self.config.api_key.is_empty() {
                    "missing".to_string()
                } else {
                    "configured".to_string()
                },
            ),
        ]);
        if let Some(model) = &self.config.model {
            summary.insert("model".to_string(), model.clone());
        }
        summary
    }
}
