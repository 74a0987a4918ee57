//! Public contract types for workflow execution.
//!
//! A [`Workflow`] is a named, ordered sequence of [`Step`]s sharing a rolling
//! JSON context. Steps are the unit of work; a step that can be semantically
//! undone exposes a compensating [`rollback`](Step::rollback).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::EngineError;

/// Lifecycle states of a tracked workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl Display for WorkflowStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of a single step execution.
///
/// Returning `success: false` fails the workflow immediately. Retryable
/// failures are signalled by returning `Err` from [`Step::execute`] instead;
/// only those are subject to the step's retry policy.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub success: bool,
    /// Replaces the rolling workflow context when present and non-null.
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Jump target for conditional branching. Ignored when it does not match
    /// any step id in the workflow.
    pub next_step_id: Option<String>,
}

impl StepResult {
    /// Successful result carrying no data; the prior context is kept.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Successful result whose data replaces the rolling context.
    pub fn ok_with_data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// Terminal failure result. Not retried.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_next_step(mut self, step_id: impl Into<String>) -> Self {
        self.next_step_id = Some(step_id.into());
        self
    }
}

/// A unit of work inside a workflow.
#[async_trait]
pub trait Step: Send + Sync {
    /// Identifier, unique within the owning workflow.
    fn id(&self) -> &str;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Runs the step against the current rolling context.
    ///
    /// # Errors
    ///
    /// `Err` marks a transient failure eligible for retry per
    /// [`can_retry`](Step::can_retry)/[`max_retries`](Step::max_retries).
    async fn execute(&self, context: &Value) -> anyhow::Result<StepResult>;

    /// Compensating action that semantically undoes this step's effect.
    /// Only invoked when [`supports_rollback`](Step::supports_rollback) is true.
    async fn rollback(&self, _context: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn supports_rollback(&self) -> bool {
        false
    }

    fn can_retry(&self) -> bool {
        false
    }

    fn max_retries(&self) -> u32 {
        0
    }
}

type ExecFn = dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<StepResult>> + Send + Sync;
type RollbackFn = dyn Fn(Value) -> anyhow::Result<()> + Send + Sync;

/// Closure-backed [`Step`], used by callers that assemble workflows from
/// domain operations without defining a struct per step.
pub struct FnStep {
    id: String,
    name: String,
    exec: Arc<ExecFn>,
    rollback: Option<Arc<RollbackFn>>,
    can_retry: bool,
    max_retries: u32,
}

impl FnStep {
    /// Builds a step from a synchronous closure.
    pub fn new<F>(id: &str, name: &str, exec: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<StepResult> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            exec: Arc::new(move |context| {
                let result = exec(&context);
                Box::pin(async move { result })
            }),
            rollback: None,
            can_retry: false,
            max_retries: 0,
        }
    }

    /// Builds a step from an asynchronous closure.
    pub fn new_async<F, Fut>(id: &str, name: &str, exec: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<StepResult>> + Send + 'static,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            exec: Arc::new(move |context| Box::pin(exec(context))),
            rollback: None,
            can_retry: false,
            max_retries: 0,
        }
    }

    /// Attaches a compensating action.
    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.rollback = Some(Arc::new(rollback));
        self
    }

    /// Marks the step retryable with the given budget.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.can_retry = true;
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl Step for FnStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, context: &Value) -> anyhow::Result<StepResult> {
        (self.exec)(context.clone()).await
    }

    async fn rollback(&self, context: &Value) -> anyhow::Result<()> {
        match &self.rollback {
            Some(rollback) => rollback(context.clone()),
            None => Ok(()),
        }
    }

    fn supports_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    fn can_retry(&self) -> bool {
        self.can_retry
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Named ordered sequence of steps executed as a unit.
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub steps: Vec<Arc<dyn Step>>,
    /// Initial rolling context handed to the first step.
    pub context: Value,
}

impl Workflow {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            steps: Vec::new(),
            context: Value::Null,
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Tracked execution state of one workflow id. Entries persist in the engine
/// until explicitly pruned so that status queries stay valid after completion.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Ids of steps that completed, in execution order. Grows during forward
    /// progress; only rollback truncates it.
    pub executed_steps: Vec<String>,
    /// Rolling context, replaced by step data as execution progresses.
    pub context: Value,
    /// Next step to run when paused or rolled back to a checkpoint.
    pub current_step_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Terminal (or pause-point) summary returned by `execute`/`resume`.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Final rolling context for completed runs.
    pub result: Option<Value>,
    pub error: Option<EngineError>,
    pub executed_steps: Vec<String>,
    pub duration: Duration,
}
