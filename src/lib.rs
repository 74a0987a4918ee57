//! Workflow orchestration core for the codescope code-intelligence toolkit.
//!
//! This crate is the process-wide engine the toolkit's analyzers hang off:
//! multi-step operations (analyze, extract, rename, ...) are composed into
//! [`Workflow`]s and executed with pause/resume/rollback/retry semantics.
//! State lives in immutable, copy-on-write value objects owned by the
//! [`StateManager`], and lifecycle notifications flow through a
//! priority-aware [`EventBus`].
//!
//! # Architecture
//!
//! - **EventBus** (`event_bus.rs`): publish/subscribe dispatcher with
//!   per-handler error isolation
//! - **State** (`state/`): `SessionState`/`ApplicationState` value objects
//!   and the `StateManager` that owns them
//! - **Workflow** (`workflow/`): definitions, retry policy, and the engine
//! - **Errors** (`errors.rs`, `handler.rs`): the engine taxonomy and the
//!   external normalization contract
//! - **Ambient** (`config.rs`, `audit.rs`): configuration and the JSONL
//!   audit log
//!
//! The domain analyzers and the CLI/MCP transports are external consumers:
//! they build workflows from domain operations and react to bus
//! notifications, but are not part of this crate.

pub mod audit;
pub mod config;
pub mod errors;
pub mod event_bus;
pub mod handler;
pub mod state;
pub mod workflow;

pub use audit::{AuditEntry, AuditLog};
pub use config::{EngineConfig, RetentionConfig, RetryConfig, SessionConfig};
pub use errors::EngineError;
pub use event_bus::{DispatchMode, Event, EventBus, EventPriority, Subscription};
pub use handler::{ErrorContext, ErrorHandler, NormalizedError, TracingErrorHandler};
pub use state::{
    ApplicationState, ModuleState, ModuleStatus, OperationRecord, SessionOptions, SessionState,
    StateManager, StateSnapshot,
};
pub use workflow::{
    BackoffStrategy, FnStep, LinearBackoff, NoBackoff, Step, StepResult, Workflow, WorkflowEngine,
    WorkflowEventPayload, WorkflowEventType, WorkflowResult, WorkflowState, WorkflowStatus,
    WORKFLOW_EVENT,
};
