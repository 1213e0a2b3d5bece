//! Hachiko Agents - policy-enforced execution backends
//!
//! The adapter contract every backend satisfies (`validate` / `execute` /
//! `config_summary`), the closed set of backends (cloud Codex, cloud
//! Devin, sandboxed local, mock), and the file-access policy engine every
//! one of them consults before mutating files.

#![warn(unreachable_pub)]

// Core modules
pub mod adapter;
pub mod cloud;
pub mod error;
pub mod mock;
pub mod policy;
pub mod sandboxed;

// Re-exports for convenience
pub use adapter::{Agent, AgentAdapter, BackendKind};
pub use cloud::{CloudAdapter, CloudAgentConfig, CloudBackend, CloudSessionOutcome};
pub use error::{BackendError, PolicyError};
pub use mock::{MockAdapter, MockAgentConfig};
pub use policy::{
    FileOperation, PolicyConfig, PolicyEngine, PolicyRule, PolicyViolation, ViolatedRule,
};
pub use sandboxed::{SandboxedAdapter, SandboxedAgentConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
