//! Error kinds for the core crate
//!
//! Propagation policy: per-unit conditions (an invalid plan, a rejected
//! transition) are contained and reported as values; infrastructure
//! failures (persistence) propagate to the top-level caller.

use crate::types::StepStatus;

/// Top-level error for core operations.
#[derive(Debug, thiserror::Error)]
pub enum HachikoError {
    /// Durable tracking state could not be read or written
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    /// Dispatch to the event distributor failed
    #[error("dispatch failure: {0}")]
    Dispatch(#[from] DispatchError),

    /// A branch name could not be encoded
    #[error("branch name error: {0}")]
    Branch(#[from] BranchNameError),
}

impl HachikoError {
    /// Whether orchestration of other plans/steps may continue.
    ///
    /// Persistence failures desynchronize displayed status from actual
    /// progress and must stop the current flow.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, HachikoError::Persistence(_))
    }
}

/// Failure to read or write the external tracking record.
///
/// Never swallowed: callers log with plan/step context and re-raise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Reading tracking state failed
    #[error("tracking store read failed for plan '{plan_id}': {message}")]
    ReadFailed {
        /// Plan whose record was being read
        plan_id: String,
        /// Underlying failure description
        message: String,
    },

    /// Writing tracking state failed
    #[error("tracking store write failed for record #{record_id}: {message}")]
    WriteFailed {
        /// Record being written
        record_id: u64,
        /// Underlying failure description
        message: String,
    },

    /// A record id resolved to nothing
    #[error("tracking record #{record_id} not found")]
    RecordNotFound {
        /// Missing record id
        record_id: u64,
    },
}

/// Failure to hand a dispatch payload to the event distributor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The distribution channel is gone
    #[error("dispatch channel closed")]
    ChannelClosed,

    /// The distributor refused the payload
    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

/// A `(plan, step, chunk)` tuple that cannot be encoded as a branch name.
///
/// Segments containing `/` are rejected rather than escaped: escaping would
/// make chunked and unchunked names ambiguous to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchNameError {
    /// A segment was empty
    #[error("branch {segment} must not be empty")]
    EmptySegment {
        /// Which segment ("plan id", "step id", "chunk")
        segment: &'static str,
    },

    /// A segment contained the separator
    #[error("branch {segment} must not contain '/': {value:?}")]
    EmbeddedSeparator {
        /// Which segment ("plan id", "step id", "chunk")
        segment: &'static str,
        /// Offending value
        value: String,
    },
}

/// A status transition outside the allowed relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    /// Current status
    pub from: StepStatus,
    /// Requested status
    pub to: StepStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_is_not_recoverable() {
        let err = HachikoError::Persistence(PersistenceError::RecordNotFound { record_id: 7 });
        assert!(!err.is_recoverable());

        let err = HachikoError::Dispatch(DispatchError::ChannelClosed);
        assert!(err.is_recoverable());
    }

    #[test]
    fn error_display_carries_context() {
        let err = PersistenceError::ReadFailed {
            plan_id: "p1".into(),
            message: "503".into(),
        };
        let text = err.to_string();
        assert!(text.contains("p1"));
        assert!(text.contains("503"));
    }
}
