//! Core types shared across the workspace
//!
//! Defines the fundamental vocabulary of the orchestrator:
//! - Step lifecycle statuses
//! - Agent execution input/result shapes
//! - Dispatch payloads handed to the event distributor
//! - External tracking-record shapes (labels + annotations)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle status of one migration step attempt.
///
/// Attached per `(plan_id, step_id, chunk?)` tuple. Transitions are driven
/// only by the state machine (`state::transitions`); adapters never mutate
/// status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Step accepted, waiting for dispatch
    Queued,
    /// An agent is executing the step
    Running,
    /// Agent finished, human review requested
    AwaitingReview,
    /// Terminal: step finished successfully
    Completed,
    /// Terminal: step failed
    Failed,
    /// Terminal: step intentionally skipped
    Skipped,
    /// Externally paused; resumes to its prior non-terminal state
    Paused,
}

impl StepStatus {
    /// Canonical kebab-case name, as used in status labels.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Queued => "queued",
            StepStatus::Running => "running",
            StepStatus::AwaitingReview => "awaiting-review",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Paused => "paused",
        }
    }

    /// Parse the canonical name back into a status.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(StepStatus::Queued),
            "running" => Some(StepStatus::Running),
            "awaiting-review" => Some(StepStatus::AwaitingReview),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            "paused" => Some(StepStatus::Paused),
            _ => None,
        }
    }

    /// Terminal for this attempt (no further transitions).
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Terminal and counting as satisfied for dependents.
    #[inline]
    #[must_use]
    pub fn is_terminal_success(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an agent backend needs to execute one step attempt.
///
/// Constructed fresh per attempt; never reused across attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    /// Plan the step belongs to
    pub plan_id: String,
    /// Step being executed
    pub step_id: String,
    /// Instructions derived from the plan body
    pub prompt: String,
    /// Ordered repository-relative paths the step may touch
    pub files: Vec<String>,
    /// Local checkout root
    pub repo_path: PathBuf,
}

/// The single normalized outcome shape every agent backend produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the step succeeded
    pub success: bool,
    /// Repository-relative paths the agent modified
    pub modified_files: Vec<String>,
    /// Repository-relative paths the agent created
    pub created_files: Vec<String>,
    /// Repository-relative paths the agent deleted
    pub deleted_files: Vec<String>,
    /// Human-readable execution summary
    pub output: String,
    /// Present iff `success` is false
    pub error: Option<String>,
    /// Process-style exit code; 0 only on success
    pub exit_code: i32,
    /// Wall clock from dispatch to return
    pub execution_time: Duration,
}

impl AgentResult {
    /// Failed result with no file changes.
    #[must_use]
    pub fn failure(error: impl Into<String>, exit_code: i32, execution_time: Duration) -> Self {
        let error = error.into();
        Self {
            success: false,
            modified_files: Vec::new(),
            created_files: Vec::new(),
            deleted_files: Vec::new(),
            output: String::new(),
            error: Some(error),
            exit_code,
            execution_time,
        }
    }

    /// Total number of file changes reported.
    #[inline]
    #[must_use]
    pub fn changed_file_count(&self) -> usize {
        self.modified_files.len() + self.created_files.len() + self.deleted_files.len()
    }
}

/// Payload handed to the external event-distribution collaborator when the
/// state machine decides the next step is eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Plan the step belongs to
    pub plan_id: String,
    /// Step to dispatch
    pub step_id: String,
    /// Optional chunk sub-unit
    pub chunk: Option<String>,
    /// Prompt configuration reference from the plan frontmatter
    pub prompt_config: Option<String>,
}

/// One immutable progress annotation on a tracking record.
///
/// Annotations are append-only; the latest annotation per `(step, chunk)`
/// is the step's current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Step the annotation refers to
    pub step_id: String,
    /// Optional chunk sub-unit
    pub chunk: Option<String>,
    /// Status recorded by this annotation
    pub status: StepStatus,
    /// Rendered metadata body
    pub body: String,
    /// When the annotation was appended
    pub timestamp: DateTime<Utc>,
}

/// External durable tracking record for one plan.
///
/// In production this is an issue owned by an external issue-tracking
/// collaborator; labels and annotations are the only durable state the
/// orchestrator keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// Numeric record id (lowest wins when several records are open)
    pub id: u64,
    /// Plan the record tracks
    pub plan_id: String,
    /// Whether the record is still open
    pub open: bool,
    /// Current labels, including `hachiko:status:*` and `hachiko:plan:*`
    pub labels: Vec<String>,
    /// Append-only progress annotations
    pub annotations: Vec<Annotation>,
}

/// Free-form metadata attached to a progress update, rendered into the
/// annotation body.
pub type ProgressMetadata = BTreeMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_name() {
        for status in [
            StepStatus::Queued,
            StepStatus::Running,
            StepStatus::AwaitingReview,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
            StepStatus::Paused,
        ] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("cancelled"), None);
    }

    #[test]
    fn terminal_classification() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal_success());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Failed.is_terminal_success());
        assert!(!StepStatus::Running.is_terminal());
        assert!(!StepStatus::Paused.is_terminal());
    }

    #[test]
    fn failure_result_shape() {
        let result = AgentResult::failure("boom", -1, Duration::from_millis(5));
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.changed_file_count(), 0);
    }
}
