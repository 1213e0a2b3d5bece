//! Error kinds for policy compilation and backend calls

/// A policy configuration that cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A glob pattern failed to compile
    #[error("invalid policy pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        message: String,
    },
}

/// A backend call that failed underneath an adapter.
///
/// Caught at the adapter boundary and translated into a failed
/// `AgentResult`; never escapes `execute`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend ran a session and it failed
    #[error("{provider} session failed: {message}")]
    SessionFailed {
        /// Backend provider tag
        provider: String,
        /// Failure description
        message: String,
        /// Native exit code, when the backend reports one
        exit_code: Option<i32>,
    },

    /// The backend could not be reached at all
    #[error("{provider} is unreachable: {message}")]
    Unreachable {
        /// Backend provider tag
        provider: String,
        /// Failure description
        message: String,
    },
}

impl BackendError {
    /// Native exit code to surface in the result, when known.
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BackendError::SessionFailed { exit_code, .. } => *exit_code,
            BackendError::Unreachable { .. } => None,
        }
    }
}
