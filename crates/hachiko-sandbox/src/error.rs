use crate::executor::ContainerPhase;

/// Sandbox failures.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The container runtime is not reachable; fails fast at `create`.
    #[error("container runtime '{runtime}' unavailable: {message}")]
    Unavailable {
        /// Runtime binary that was probed
        runtime: String,
        /// Probe failure description
        message: String,
    },

    /// The runtime refused to create or start the container.
    #[error("container create failed: {stderr}")]
    CreateFailed {
        /// Runtime stderr
        stderr: String,
    },

    /// A command targeted a context that is not running.
    #[error("container '{container_id}' is not running (phase {phase:?})")]
    InvalidContext {
        /// Target container
        container_id: String,
        /// Phase the executor knows it to be in
        phase: ContainerPhase,
    },

    /// Spawning or waiting on a process failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
