//! Multi-phase audit pipeline
//!
//! A fixed DAG of phases with budget accounting and crash-safe
//! checkpoint/resume. Pure phases run in-process; delegated phases go through
//! the injected [`PhaseExecutor`](executor::PhaseExecutor).

pub mod budget;
pub mod checkpoint;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod phases;
pub mod registry;

pub use budget::BudgetTracker;
pub use checkpoint::{Checkpoint, CheckpointManager, ResumeDecision};
pub use context::AuditContext;
pub use executor::{
    ExecutorError, ExecutorResponse, MockExecutor, PhaseExecutor, UnavailableExecutor,
};
pub use orchestrator::{AuditOrchestrator, AuditReport, PhaseRecord, PhaseRunStatus};
pub use registry::{PhaseId, PhaseKind, PhaseRegistry, PhaseSpec};

use thiserror::Error;

/// Pipeline-level failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("phase {phase} depends on unknown phase {dependency}")]
    UnknownDependency { phase: String, dependency: String },

    #[error("cyclic phase dependencies involving: {phases}")]
    CyclicDependency { phases: String },

    #[error("budget exceeded before phase {phase}: spent {spent:.2} of {limit:.2}")]
    BudgetExceeded {
        phase: String,
        spent: f64,
        limit: f64,
    },

    #[error("audit cancelled")]
    Cancelled,
}
