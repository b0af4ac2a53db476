//! Orchestration engine for automated code changes.
//!
//! A run plans a change with read-only tools, implements the plan step by
//! step, builds the project, and on failure plans a fix from the build
//! diagnostics and implements it again. Fix cycles are bounded by a
//! [`CycleGovernor`]; every run ends in exactly one [`TerminalStatus`].

pub mod build;
pub mod conversation;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod governor;
pub mod model;
mod phases;
pub mod plan;
pub mod prompts;
pub mod report;
pub mod retry;
pub mod state;

pub use build::{
    extract_diagnostics, BuildOutcome, BuildRunner, CommandBuildRunner, DiagnosticMarkers,
};
pub use conversation::{ConversationBuffer, Reply, Turn};
pub use dispatcher::ToolDispatcher;
pub use engine::{Engine, EngineConfig};
pub use events::{EngineEvent, EventEmitter};
pub use governor::{CycleDecision, CycleGovernor};
pub use model::ModelCaller;
pub use plan::{DependencyCheck, DependencyViolation, Plan, Step, ViolationKind};
pub use prompts::PromptSet;
pub use report::{load_report, save_report, RunReport};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use state::{EngineState, Phase, StepState, TerminalStatus};
