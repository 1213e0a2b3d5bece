//! Sandboxed local backend
//!
//! Runs a local agent process inside the container sandbox. Each execution
//! owns a fresh workspace and container; the container is destroyed on
//! every exit path, including timeouts and command failures. File changes
//! are recovered from the repository checkout with `git status` through
//! the bare (uncontained) executor.

use crate::adapter::{policy_rejection, AgentAdapter};
use crate::policy::{FileOperation, PolicyEngine};
use async_trait::async_trait;
use hachiko_core::types::{AgentInput, AgentResult};
use hachiko_sandbox::{
    execute_command, CommandOutput, ContainerContext, SandboxError, SandboxExecutor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sandboxed backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxedAgentConfig {
    /// Agent command run inside the container; the prompt file path is
    /// appended as its final argument
    pub agent_command: String,
    /// Wall-clock limit for one agent run
    pub execution_timeout: Duration,
}

impl SandboxedAgentConfig {
    /// Configuration for an agent command.
    #[must_use]
    pub fn new(agent_command: impl Into<String>) -> Self {
        Self {
            agent_command: agent_command.into(),
            execution_timeout: Duration::from_secs(900),
        }
    }

    /// With an execution timeout.
    #[inline]
    #[must_use]
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

/// Local agent backend running inside the container sandbox.
pub struct SandboxedAdapter {
    config: SandboxedAgentConfig,
    policy: PolicyEngine,
    executor: Arc<SandboxExecutor>,
}

impl SandboxedAdapter {
    /// Sandboxed adapter over a compiled policy and a sandbox executor.
    #[must_use]
    pub fn new(
        config: SandboxedAgentConfig,
        policy: PolicyEngine,
        executor: Arc<SandboxExecutor>,
    ) -> Self {
        Self {
            config,
            policy,
            executor,
        }
    }

    async fn run_agent(
        &self,
        context: &ContainerContext,
    ) -> Result<CommandOutput, SandboxError> {
        let workdir = &self.executor.config().workdir;
        let command = format!("{} {workdir}/prompt.md", self.config.agent_command);
        self.executor
            .execute_in(context, &command, Some(self.config.execution_timeout))
            .await
    }
}

#[async_trait]
impl AgentAdapter for SandboxedAdapter {
    async fn validate(&self) -> bool {
        self.executor.available().await
    }

    async fn execute(&self, input: AgentInput) -> AgentResult {
        let started = Instant::now();

        let violations = self
            .policy
            .check(&input.files, &input.repo_path, FileOperation::Write);
        if !violations.is_empty() {
            return policy_rejection(&input, &violations, started);
        }

        let workspace = match tempfile::tempdir() {
            Ok(workspace) => workspace,
            Err(e) => {
                return AgentResult::failure(
                    format!("workspace setup failed: {e}"),
                    -1,
                    started.elapsed(),
                )
            }
        };
        if let Err(e) =
            tokio::fs::write(workspace.path().join("prompt.md"), &input.prompt).await
        {
            return AgentResult::failure(
                format!("writing prompt failed: {e}"),
                -1,
                started.elapsed(),
            );
        }

        let context = match self
            .executor
            .create(workspace.path(), &input.repo_path)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(
                    "sandbox for step '{}' of plan '{}' could not be created: {}",
                    input.step_id,
                    input.plan_id,
                    e
                );
                return AgentResult::failure(e.to_string(), -1, started.elapsed());
            }
        };

        // The container is destroyed on every exit path from here on.
        let run = self.run_agent(&context).await;
        self.executor.destroy(&context.container_id).await;

        let output = match run {
            Ok(output) => output,
            Err(e) => {
                return AgentResult::failure(e.to_string(), -1, started.elapsed());
            }
        };

        let (modified_files, created_files, deleted_files) =
            match git_changes(&input.repo_path).await {
                Ok(changes) => changes,
                Err(e) => {
                    tracing::warn!(
                        "could not recover file changes for plan '{}': {}",
                        input.plan_id,
                        e
                    );
                    (Vec::new(), Vec::new(), Vec::new())
                }
            };

        let success = output.success();
        let error = if output.timed_out {
            Some(format!(
                "agent command timed out after {}s",
                self.config.execution_timeout.as_secs()
            ))
        } else if !success {
            let stderr = output.stderr.trim();
            Some(format!(
                "agent command exited with code {}: {stderr}",
                output.exit_code
            ))
        } else {
            None
        };

        AgentResult {
            success,
            modified_files,
            created_files,
            deleted_files,
            output: output.stdout,
            error,
            exit_code: output.exit_code,
            execution_time: started.elapsed(),
        }
    }

    fn config_summary(&self) -> BTreeMap<String, String> {
        let container = self.executor.config();
        BTreeMap::from([
            ("backend".to_string(), "sandboxed-local".to_string()),
            (
                "agent_command".to_string(),
                self.config.agent_command.clone(),
            ),
            ("runtime".to_string(), container.runtime.clone()),
            ("image".to_string(), container.image.clone()),
            (
                "execution_timeout_s".to_string(),
                self.config.execution_timeout.as_secs().to_string(),
            ),
        ])
    }
}

/// Recover the repository's file changes from `git status --porcelain`.
async fn git_changes(
    repo_path: &Path,
) -> Result<(Vec<String>, Vec<String>, Vec<String>), SandboxError> {
    let status = execute_command("git", &["status", "--porcelain"], Some(repo_path), None).await?;
    if !status.success() {
        tracing::warn!(
            "git status in {} exited with {}; reporting no changes",
            repo_path.display(),
            status.exit_code
        );
        return Ok((Vec::new(), Vec::new(), Vec::new()));
    }
    Ok(parse_porcelain(&status.stdout))
}

/// Split porcelain status lines into (modified, created, deleted).
fn parse_porcelain(text: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut modified = Vec::new();
    let mut created = Vec::new();
    let mut deleted = Vec::new();

    for line in text.lines() {
        if line.len() < 4 {
            continue;
        }
        let status = &line[..2];
        let mut path = line[3..].trim();
        // Renames report "old -> new"; the new path is the interesting one.
        if let Some((_, renamed)) = path.split_once(" -> ") {
            path = renamed;
        }

        if status.contains('?') || status.contains('A') {
            created.push(path.to_string());
        } else if status.contains('D') {
            deleted.push(path.to_string());
        } else {
            modified.push(path.to_string());
        }
    }

    (modified, created, deleted)
}
