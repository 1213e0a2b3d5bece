//! The agent-adapter contract
//!
//! Every execution backend satisfies the same three-method contract and
//! produces the same normalized [`AgentResult`] shape. Backends form a
//! closed set ([`Agent`]): adding one means adding a variant and its
//! implementation, never modifying dispatch logic.

use crate::cloud::CloudAdapter;
use crate::mock::MockAdapter;
use crate::policy::PolicyViolation;
use crate::sandboxed::SandboxedAdapter;
use async_trait::async_trait;
use hachiko_core::types::{AgentInput, AgentResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Contract every execution backend must satisfy.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Backend-specific readiness check (credentials present, daemon
    /// reachable). Never mutates state.
    async fn validate(&self) -> bool;

    /// Execute one step attempt.
    ///
    /// Must evaluate the file-access policy before any mutation; on
    /// violation the result is a failure with exit code 1 and an error
    /// enumerating every violated rule. Backend failures are caught here
    /// and translated, never propagated. `execution_time` is measured from
    /// call entry to return on every path.
    async fn execute(&self, input: AgentInput) -> AgentResult;

    /// Loggable configuration summary. Never includes secrets.
    fn config_summary(&self) -> BTreeMap<String, String>;
}

/// The closed set of execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Cloud-hosted Codex sessions
    CloudCodex,
    /// Cloud-hosted Devin sessions
    CloudDevin,
    /// Local agent process inside the container sandbox
    SandboxedLocal,
    /// Simulated agent, normative for testing the others
    Mock,
}

impl BackendKind {
    /// Canonical kebab-case tag.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::CloudCodex => "cloud-codex",
            BackendKind::CloudDevin => "cloud-devin",
            BackendKind::SandboxedLocal => "sandboxed-local",
            BackendKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged-variant dispatch over the backend set.
pub enum Agent {
    /// Cloud-hosted Codex backend
    CloudCodex(CloudAdapter),
    /// Cloud-hosted Devin backend
    CloudDevin(CloudAdapter),
    /// Sandboxed local backend
    SandboxedLocal(SandboxedAdapter),
    /// Mock backend
    Mock(MockAdapter),
}

impl Agent {
    /// Which backend this is.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Agent::CloudCodex(_) => BackendKind::CloudCodex,
            Agent::CloudDevin(_) => BackendKind::CloudDevin,
            Agent::SandboxedLocal(_) => BackendKind::SandboxedLocal,
            Agent::Mock(_) => BackendKind::Mock,
        }
    }
}

#[async_trait]
impl AgentAdapter for Agent {
    async fn validate(&self) -> bool {
        match self {
            Agent::CloudCodex(a) | Agent::CloudDevin(a) => a.validate().await,
            Agent::SandboxedLocal(a) => a.validate().await,
            Agent::Mock(a) => a.validate().await,
        }
    }

    async fn execute(&self, input: AgentInput) -> AgentResult {
        match self {
            Agent::CloudCodex(a) | Agent::CloudDevin(a) => a.execute(input).await,
            Agent::SandboxedLocal(a) => a.execute(input).await,
            Agent::Mock(a) => a.execute(input).await,
        }
    }

    fn config_summary(&self) -> BTreeMap<String, String> {
        match self {
            Agent::CloudCodex(a) | Agent::CloudDevin(a) => a.config_summary(),
            Agent::SandboxedLocal(a) => a.config_summary(),
            Agent::Mock(a) => a.config_summary(),
        }
    }
}

/// Build the mandatory policy-rejection result: exit code 1, empty change
/// sets, an error naming every violated rule.
pub(crate) fn policy_rejection(
    input: &AgentInput,
    violations: &[PolicyViolation],
    started: Instant,
) -> AgentResult {
    let details = violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    tracing::warn!(
        "step '{}' of plan '{}' rejected by policy: {}",
        input.step_id,
        input.plan_id,
        details
    );
    AgentResult::failure(
        format!("file-access policy violations: {details}"),
        1,
        started.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kinds_have_stable_tags() {
        assert_eq!(BackendKind::CloudCodex.as_str(), "cloud-codex");
        assert_eq!(BackendKind::CloudDevin.as_str(), "cloud-devin");
        assert_eq!(BackendKind::SandboxedLocal.as_str(), "sandboxed-local");
        assert_eq!(BackendKind::Mock.as_str(), "mock");
    }

    #[test]
    fn kind_tags_round_trip_through_serde() {
        let json = serde_json::to_string(&BackendKind::SandboxedLocal).unwrap();
        assert_eq!(json, "\"sandboxed-local\"");
        let parsed: BackendKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, BackendKind::SandboxedLocal);
    }
}
