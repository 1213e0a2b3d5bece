//! Hachiko Sandbox - isolated execution for untrusted agent commands
//!
//! Drives an existing container runtime to run agent commands with bounded
//! resources and time, plus a bare subprocess variant for operations that
//! need no isolation (local git, runtime probes). Every command runs under
//! a hard wall-clock timeout and returns captured partial output even when
//! killed.

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod executor;
pub mod process;

pub use config::ContainerConfig;
pub use error::SandboxError;
pub use executor::{ContainerContext, ContainerPhase, SandboxExecutor};
pub use process::{
    execute_command, CommandOutput, DEFAULT_COMMAND_TIMEOUT, TIMEOUT_EXIT_CODE,
};
