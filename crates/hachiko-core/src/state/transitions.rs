//! Step-status transition relation
//!
//! `queued -> running -> {completed, failed, skipped}`;
//! `running -> awaiting-review -> {completed, failed}`; any non-terminal
//! state may pause, and a paused step resumes to its prior non-terminal
//! state. Terminal states admit no transitions; re-queuing a failed step is
//! an explicit external decision (`ProgressTracker::requeue`), not a
//! transition.

use crate::error::TransitionError;
use crate::types::StepStatus;

/// States reachable from `from` in one legal transition.
#[must_use]
pub fn allowed_transitions(from: StepStatus) -> Vec<StepStatus> {
    use StepStatus::*;
    match from {
        Queued => vec![Running, Paused],
        Running => vec![Completed, Failed, Skipped, AwaitingReview, Paused],
        AwaitingReview => vec![Completed, Failed, Paused],
        Paused => vec![Queued, Running, AwaitingReview],
        Completed | Failed | Skipped => vec![],
    }
}

/// Validate a single transition.
pub fn validate_transition(from: StepStatus, to: StepStatus) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}
