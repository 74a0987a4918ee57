//! External error-normalization contract.
//!
//! The engine never defines its own failure normalization. Terminal errors
//! are forwarded to an [`ErrorHandler`] collaborator together with an
//! [`ErrorContext`] describing where the failure happened; the collaborator
//! decides how to classify and report it.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Where a failure happened, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    /// Component that raised the error (e.g. "workflow-engine").
    pub module: String,
    /// Operation in flight (e.g. "execute", "rollback").
    pub operation: String,
    /// Operation parameters worth reporting (workflow id, step id, ...).
    pub parameters: HashMap<String, Value>,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    /// Builds a context for an engine operation, stamped with the current time.
    pub fn new(module: &str, operation: &str) -> Self {
        Self {
            module: module.to_string(),
            operation: operation.to_string(),
            parameters: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// A failure after normalization by the external handler.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedError {
    pub code: String,
    pub message: String,
    pub context: ErrorContext,
}

/// External collaborator that normalizes engine failures.
///
/// Implementations live outside the core (the toolkit's shared error module);
/// [`TracingErrorHandler`] is a minimal default for standalone use.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &EngineError, context: ErrorContext) -> NormalizedError;
}

/// Default handler: logs the failure via `tracing` and passes the engine's
/// own code/message through unchanged.
#[derive(Debug, Default)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn handle(&self, error: &EngineError, context: ErrorContext) -> NormalizedError {
        tracing::warn!(
            "{}.{} failed: {} ({})",
            context.module,
            context.operation,
            error,
            error.code()
        );
        NormalizedError {
            code: error.code().to_string(),
            message: error.to_string(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_handler_preserves_code_and_context() {
        let handler = TracingErrorHandler;
        let err = EngineError::UnknownWorkflow {
            workflow_id: "wf9".to_string(),
        };
        let ctx = ErrorContext::new("workflow-engine", "resume").with_parameter("workflow_id", "wf9");
        let normalized = handler.handle(&err, ctx);
        assert_eq!(normalized.code, "UNKNOWN_WORKFLOW");
        assert_eq!(normalized.context.operation, "resume");
        assert_eq!(
            normalized.context.parameters.get("workflow_id"),
            Some(&Value::String("wf9".to_string()))
        );
    }
}
