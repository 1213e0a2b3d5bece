//! Hachiko Core - migration orchestration primitives
//!
//! The declarative half of the orchestrator:
//! - Loads and validates migration plans (frontmatter + dependency DAG)
//! - Encodes step identity into recoverable branch names
//! - Drives the step-status state machine over an external tracking record
//! - Decides, on each terminal outcome, which step to dispatch next
//!
//! Execution backends live in `hachiko-agents`; container isolation lives
//! in `hachiko-sandbox`.

#![warn(unreachable_pub)]

// Core modules
pub mod branch;
pub mod error;
pub mod plan;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use branch::{branch_name, is_migration_branch, parse_branch, BranchRef, BRANCH_PREFIX};
pub use error::{
    BranchNameError, DispatchError, HachikoError, PersistenceError, TransitionError,
};
pub use plan::{
    discover, load_all, normalized_frontmatter, parse, serialize_frontmatter,
    validate_dependencies, DiscoveryConfig, MigrationPlan, MigrationStep, ParsedPlan,
    PlanFrontmatter, StepFrontmatter, StepGraph,
};
pub use state::{
    ChannelDispatcher, InMemoryTrackingStore, ProgressTracker, StepDispatcher, TrackingStore,
    UpdateOutcome,
};
pub use types::{
    AgentInput, AgentResult, Annotation, DispatchPayload, ProgressMetadata, StepStatus,
    TrackingRecord,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Hachiko Core
    pub use crate::{
        branch_name, parse_branch, validate_dependencies, AgentInput, AgentResult,
        DiscoveryConfig, DispatchPayload, MigrationPlan, MigrationStep, ProgressTracker,
        StepDispatcher, StepStatus, TrackingStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
