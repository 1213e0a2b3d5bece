//! The coordination facade
//!
//! One [`Orchestrator`] per repository: it reloads plans per trigger,
//! resolves branch refs to steps, runs the configured agent backend under
//! its policy, feeds outcomes into the state machine, and emits the next
//! eligible step. A bad plan or a failed step never halts the others;
//! persistence failures propagate.

use hachiko_agents::{Agent, AgentAdapter};
use hachiko_core::branch::{is_migration_branch, parse_branch};
use hachiko_core::error::HachikoError;
use hachiko_core::plan::{
    load_all, validate_dependencies, DiscoveryConfig, MigrationPlan, StepGraph,
};
use hachiko_core::state::{ProgressTracker, StepDispatcher, TrackingStore};
use hachiko_core::types::{
    AgentInput, AgentResult, DispatchPayload, ProgressMetadata, StepStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Local repository checkout root
    pub repo_root: PathBuf,
    /// Root under which plan files are discovered
    pub plans_root: PathBuf,
    /// Plan discovery settings
    pub discovery: DiscoveryConfig,
}

impl OrchestratorConfig {
    /// Configuration for one repository; plans are discovered under its
    /// root by default.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        Self {
            plans_root: repo_root.clone(),
            repo_root,
            discovery: DiscoveryConfig::new(),
        }
    }

    /// With a dedicated plans directory.
    #[inline]
    #[must_use]
    pub fn with_plans_root(mut self, plans_root: impl Into<PathBuf>) -> Self {
        self.plans_root = plans_root.into();
        self
    }
}

/// What one step execution did, end to end.
#[derive(Debug, Clone)]
pub struct StepRunReport {
    /// Plan the step belongs to
    pub plan_id: String,
    /// Step that ran
    pub step_id: String,
    /// Chunk sub-unit, when the trigger named one
    pub chunk: Option<String>,
    /// Terminal status recorded for the attempt
    pub status: StepStatus,
    /// Normalized agent outcome
    pub result: AgentResult,
    /// Follow-up dispatch, when one was emitted
    pub dispatched: Option<DispatchPayload>,
}

/// Coordinates plans, the state machine, and one agent backend.
pub struct Orchestrator<S, D> {
    config: OrchestratorConfig,
    tracker: ProgressTracker<S>,
    dispatcher: D,
    agent: Agent,
}

impl<S, D> Orchestrator<S, D>
where
    S: TrackingStore,
    D: StepDispatcher,
{
    /// Wire up an orchestrator from its collaborators.
    #[must_use]
    pub fn new(config: OrchestratorConfig, store: Arc<S>, dispatcher: D, agent: Agent) -> Self {
        Self {
            config,
            tracker: ProgressTracker::new(store),
            dispatcher,
            agent,
        }
    }

    /// The progress tracker, for callers that drive status directly.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker<S> {
        &self.tracker
    }

    /// Reload and validate plans.
    ///
    /// Returns the valid plans plus one plain-language problem per invalid
    /// candidate or dependency violation; offending plans are skipped, the
    /// rest proceed.
    #[must_use]
    pub fn load_plans(&self) -> (Vec<MigrationPlan>, Vec<String>) {
        let mut plans = Vec::new();
        let mut problems = Vec::new();

        for parsed in load_all(&self.config.plans_root, &self.config.discovery) {
            match parsed.plan {
                Some(plan) => plans.push(plan),
                None => problems.extend(parsed.errors),
            }
        }

        problems.extend(validate_dependencies(&plans));
        let (valid, invalid): (Vec<_>, Vec<_>) = plans
            .into_iter()
            .partition(|plan| StepGraph::build(plan).violations().is_empty());
        for plan in &invalid {
            tracing::warn!("skipping plan '{}': dependency violations", plan.id);
        }
        (valid, problems)
    }

    /// React to a version-control branch event.
    ///
    /// Non-migration branches and unknown plans are ignored (`None`); a
    /// recognized branch runs its step.
    pub async fn handle_branch_event(
        &self,
        branch: &str,
    ) -> Result<Option<StepRunReport>, HachikoError> {
        if !is_migration_branch(branch) {
            return Ok(None);
        }
        let Some(branch_ref) = parse_branch(branch) else {
            tracing::debug!("ignoring malformed migration branch '{}'", branch);
            return Ok(None);
        };

        let (plans, problems) = self.load_plans();
        for problem in &problems {
            tracing::warn!("{}", problem);
        }
        let Some(plan) = plans.iter().find(|p| p.id == branch_ref.plan_id) else {
            tracing::warn!(
                "branch '{}' names unknown plan '{}'",
                branch,
                branch_ref.plan_id
            );
            return Ok(None);
        };

        self.run_step(plan, &branch_ref.step_id, branch_ref.chunk.as_deref())
            .await
            .map(Some)
    }

    /// Execute one step attempt and record its lifecycle.
    ///
    /// Marks the step `running`, executes the agent, records the terminal
    /// status with execution metadata, and emits the next eligible step on
    /// terminal success. Only persistence/dispatch failures propagate; a
    /// failing agent is a recorded outcome, not an error.
    pub async fn run_step(
        &self,
        plan: &MigrationPlan,
        step_id: &str,
        chunk: Option<&str>,
    ) -> Result<StepRunReport, HachikoError> {
        let Some(step) = plan.step(step_id) else {
            tracing::warn!("plan '{}' has no step '{}'", plan.id, step_id);
            return Ok(StepRunReport {
                plan_id: plan.id.clone(),
                step_id: step_id.to_string(),
                chunk: chunk.map(str::to_string),
                status: StepStatus::Failed,
                result: AgentResult::failure(
                    format!("plan '{}' has no step '{}'", plan.id, step_id),
                    1,
                    Duration::ZERO,
                ),
                dispatched: None,
            });
        };

        let mut metadata = ProgressMetadata::new();
        metadata.insert("backend".into(), json!(self.agent.kind().as_str()));
        self.tracker
            .update_progress(&plan.id, step_id, chunk, StepStatus::Running, &metadata)
            .await?;

        let input = AgentInput {
            plan_id: plan.id.clone(),
            step_id: step_id.to_string(),
            prompt: plan.prompt_for_step(&step),
            files: step.files.clone(),
            repo_path: self.config.repo_root.clone(),
        };
        let result = self.agent.execute(input).await;

        let status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let mut metadata = ProgressMetadata::new();
        metadata.insert("success".into(), json!(result.success));
        metadata.insert("exit_code".into(), json!(result.exit_code));
        metadata.insert(
            "duration_ms".into(),
            json!(result.execution_time.as_millis() as u64),
        );
        metadata.insert("files_changed".into(), json!(result.changed_file_count()));
        if let Some(error) = &result.error {
            metadata.insert("error".into(), json!(error));
        }
        self.tracker
            .update_progress(&plan.id, step_id, chunk, status, &metadata)
            .await?;

        let dispatched = if status.is_terminal_success() {
            self.tracker
                .emit_next_step(plan, step_id, chunk, &self.dispatcher)
                .await?
        } else {
            None
        };

        Ok(StepRunReport {
            plan_id: plan.id.clone(),
            step_id: step_id.to_string(),
            chunk: chunk.map(str::to_string),
            status,
            result,
            dispatched,
        })
    }
}
