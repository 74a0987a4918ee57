//! Error types for the workflow orchestration core.

use crate::workflow::WorkflowStatus;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Errors raised by the workflow engine and its collaborators.
///
/// Every variant carries enough structure for the CLI/MCP layers to render
/// actionable diagnostics: a stable [`code`](EngineError::code) plus a
/// [`context`](EngineError::context) map with the workflow id, step id and
/// attempt count where applicable.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Malformed workflow or step definition. Never retried.
    Validation { message: String },
    /// A second `execute` was issued for a workflow id that is still active.
    AlreadyRunning { workflow_id: String },
    /// Lifecycle call on a workflow id the engine has never seen.
    UnknownWorkflow { workflow_id: String },
    /// `resume` on a workflow that is not paused.
    NotPaused {
        workflow_id: String,
        status: WorkflowStatus,
    },
    /// `rollback` targeted a step that is not in the executed list.
    StepNotExecuted {
        workflow_id: String,
        step_id: String,
    },
    /// A step exhausted its retry budget (or was not retryable).
    StepFailed {
        workflow_id: String,
        step_id: String,
        attempts: u32,
        message: String,
    },
    /// A compensating `rollback` callback failed. Remaining compensations in
    /// the same call were aborted; earlier ones are not undone.
    RollbackFailed {
        workflow_id: String,
        step_id: String,
        message: String,
    },
    /// Invariant breach inside the engine itself (tracked state vanished,
    /// cursor out of range). Surfaced as a failed result, never a panic.
    Internal { message: String },
}

impl EngineError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::UnknownWorkflow { .. } => "UNKNOWN_WORKFLOW",
            Self::NotPaused { .. } => "NOT_PAUSED",
            Self::StepNotExecuted { .. } => "STEP_NOT_EXECUTED",
            Self::StepFailed { .. } => "STEP_FAILED",
            Self::RollbackFailed { .. } => "ROLLBACK_FAILED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Diagnostic context for rendering by outer layers.
    pub fn context(&self) -> HashMap<String, String> {
        let mut ctx = HashMap::new();
        match self {
            Self::Validation { .. } | Self::Internal { .. } => {}
            Self::AlreadyRunning { workflow_id } | Self::UnknownWorkflow { workflow_id } => {
                ctx.insert("workflow_id".to_string(), workflow_id.clone());
            }
            Self::NotPaused {
                workflow_id,
                status,
            } => {
                ctx.insert("workflow_id".to_string(), workflow_id.clone());
                ctx.insert("status".to_string(), status.to_string());
            }
            Self::StepNotExecuted {
                workflow_id,
                step_id,
            }
            | Self::RollbackFailed {
                workflow_id,
                step_id,
                ..
            } => {
                ctx.insert("workflow_id".to_string(), workflow_id.clone());
                ctx.insert("step_id".to_string(), step_id.clone());
            }
            Self::StepFailed {
                workflow_id,
                step_id,
                attempts,
                ..
            } => {
                ctx.insert("workflow_id".to_string(), workflow_id.clone());
                ctx.insert("step_id".to_string(), step_id.clone());
                ctx.insert("attempts".to_string(), attempts.to_string());
            }
        }
        ctx
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "invalid workflow: {}", message),
            Self::AlreadyRunning { workflow_id } => {
                write!(f, "workflow '{}' is already running", workflow_id)
            }
            Self::UnknownWorkflow { workflow_id } => {
                write!(f, "unknown workflow '{}'", workflow_id)
            }
            Self::NotPaused {
                workflow_id,
                status,
            } => write!(
                f,
                "workflow '{}' is not paused (status: {})",
                workflow_id, status
            ),
            Self::StepNotExecuted {
                workflow_id,
                step_id,
            } => write!(
                f,
                "step '{}' was not executed in workflow '{}'",
                step_id, workflow_id
            ),
            Self::StepFailed {
                workflow_id,
                step_id,
                attempts,
                message,
            } => write!(
                f,
                "step '{}' of workflow '{}' failed after {} attempt(s): {}",
                step_id, workflow_id, attempts, message
            ),
            Self::RollbackFailed {
                workflow_id,
                step_id,
                message,
            } => write!(
                f,
                "rollback of step '{}' in workflow '{}' failed: {}",
                step_id, workflow_id, message
            ),
            Self::Internal { message } => write!(f, "internal engine error: {}", message),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failed_carries_code_and_context() {
        let err = EngineError::StepFailed {
            workflow_id: "wf1".to_string(),
            step_id: "extract".to_string(),
            attempts: 3,
            message: "io error".to_string(),
        };
        assert_eq!(err.code(), "STEP_FAILED");
        let ctx = err.context();
        assert_eq!(ctx.get("workflow_id").map(String::as_str), Some("wf1"));
        assert_eq!(ctx.get("step_id").map(String::as_str), Some("extract"));
        assert_eq!(ctx.get("attempts").map(String::as_str), Some("3"));
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn validation_has_empty_context() {
        let err = EngineError::Validation {
            message: "empty id".to_string(),
        };
        assert_eq!(err.code(), "VALIDATION");
        assert!(err.context().is_empty());
    }
}
