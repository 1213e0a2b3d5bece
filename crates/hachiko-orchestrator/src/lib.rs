//! Hachiko Orchestrator - the coordination facade
//!
//! Turns incoming triggers (branch events, explicit step targets) into the
//! full cycle: reload plans, validate, execute the step through a
//! policy-enforced agent backend, record status on the external tracking
//! record, and dispatch the next eligible step.

#![warn(unreachable_pub)]

pub mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorConfig, StepRunReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
