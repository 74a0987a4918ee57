//! Workflow orchestration: definitions, retry policy, and the engine.
//!
//! - **Types** (`types.rs`): the public contract types `Workflow`, `Step`,
//!   `StepResult`, and the tracked `WorkflowState`
//! - **Retry** (`retry.rs`): pluggable backoff strategies
//! - **Engine** (`engine.rs`): the state machine driving execution with
//!   pause/resume/rollback/retry

pub mod engine;
pub mod retry;
pub mod types;

pub use engine::{WorkflowEngine, WorkflowEventPayload, WorkflowEventType, WORKFLOW_EVENT};
pub use retry::{BackoffStrategy, LinearBackoff, NoBackoff};
pub use types::{
    FnStep, Step, StepResult, Workflow, WorkflowResult, WorkflowState, WorkflowStatus,
};
