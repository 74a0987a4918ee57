//! Workflow execution engine.
//!
//! The engine is the ONLY place workflow status transitions happen. It owns
//! the per-workflow tracking map, validates definitions before any side
//! effect, drives the step loop with pause/resume/rollback/retry semantics,
//! and publishes lifecycle events on the shared [`EventBus`].
//!
//! Status transitions: `Pending → Running → {Paused, Completed, Failed}`,
//! `Paused → Running` via `resume`, and `rollback` forces any non-running
//! state back to `Pending`.

use crate::errors::EngineError;
use crate::event_bus::{DispatchMode, Event, EventBus};
use crate::handler::{ErrorContext, ErrorHandler};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::retry::{BackoffStrategy, LinearBackoff};
use super::types::{Step, StepResult, Workflow, WorkflowResult, WorkflowState, WorkflowStatus};

/// Event type under which all engine lifecycle notifications are published.
pub const WORKFLOW_EVENT: &str = "workflow-event";

/// Lifecycle moments published for each workflow. Per workflow the sequence
/// is always `started → (step-completed)* → (completed | failed | paused)`,
/// with `resumed` re-opening the step-completed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowEventType {
    Started,
    Paused,
    Resumed,
    Completed,
    Failed,
    StepCompleted,
}

/// Payload of every [`WORKFLOW_EVENT`] notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEventPayload {
    pub workflow_id: String,
    pub event_type: WorkflowEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

struct RunEntry {
    workflow: Arc<Workflow>,
    state: WorkflowState,
    /// True while a `run_loop` is executing for this id. A pause request
    /// flips the status immediately, but the loop keeps driving its
    /// in-flight step until the next boundary; this flag is what says
    /// whether the loop has actually parked.
    loop_active: bool,
}

/// Orchestrates multi-step workflow executions.
///
/// Distinct workflow ids execute fully concurrently and share only the event
/// bus and the tracking map. Tracked state persists after completion so that
/// status queries and late rollbacks stay valid; callers with long-lived
/// processes should wire [`prune_finished`](WorkflowEngine::prune_finished)
/// to a retention policy.
pub struct WorkflowEngine {
    bus: Arc<EventBus>,
    error_handler: Arc<dyn ErrorHandler>,
    backoff: Arc<dyn BackoffStrategy>,
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl WorkflowEngine {
    pub fn new(bus: Arc<EventBus>, error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            bus,
            error_handler,
            backoff: Arc::new(LinearBackoff::default()),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the retry backoff strategy.
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Executes `workflow` from its first step.
    ///
    /// The definition is registered and tracked for the engine's lifetime
    /// (rollback needs it even after completion). A workflow id may be
    /// re-executed once its previous run is no longer active: the guard
    /// rejects only ids whose tracked status is `Running` or `Paused`.
    ///
    /// # Errors
    ///
    /// Fails synchronously (before any side effect) on a malformed
    /// definition or when the id is still active. Step failures do NOT
    /// surface here; they come back as an `Ok` result with
    /// [`WorkflowStatus::Failed`].
    pub async fn execute(&self, workflow: Workflow) -> Result<WorkflowResult, EngineError> {
        validate_workflow(&workflow)?;
        let id = workflow.id.clone();

        {
            let mut runs = self.runs.lock().await;
            if let Some(entry) = runs.get(&id) {
                if matches!(
                    entry.state.status,
                    WorkflowStatus::Running | WorkflowStatus::Paused
                ) {
                    return Err(EngineError::AlreadyRunning { workflow_id: id });
                }
            }
            let context = workflow.context.clone();
            runs.insert(
                id.clone(),
                RunEntry {
                    workflow: Arc::new(workflow),
                    state: WorkflowState {
                        workflow_id: id.clone(),
                        status: WorkflowStatus::Running,
                        executed_steps: Vec::new(),
                        context,
                        current_step_id: None,
                        started_at: Utc::now(),
                        finished_at: None,
                        error: None,
                    },
                    loop_active: true,
                },
            );
        }

        tracing::debug!("workflow '{}' started", id);
        self.publish(WorkflowEventPayload {
            workflow_id: id.clone(),
            event_type: WorkflowEventType::Started,
            step_id: None,
            data: None,
        })
        .await;

        self.run_loop(&id, 0).await
    }

    /// Requests a pause. Observed by the step loop only at step boundaries:
    /// an in-flight step always runs to completion first.
    ///
    /// # Errors
    ///
    /// Fails if `id` was never executed. Pausing a workflow that is not
    /// running is silently ignored.
    pub async fn pause(&self, id: &str) -> Result<(), EngineError> {
        let mut runs = self.runs.lock().await;
        let entry = runs.get_mut(id).ok_or_else(|| EngineError::UnknownWorkflow {
            workflow_id: id.to_string(),
        })?;
        if entry.state.status == WorkflowStatus::Running {
            entry.state.status = WorkflowStatus::Paused;
            tracing::debug!("workflow '{}' pause requested", id);
        }
        Ok(())
    }

    /// Resumes a paused workflow from its first un-executed step, appending
    /// onto the same executed-step list and rolling context.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown, the workflow is not paused, or the paused
    /// loop has not parked yet (the pause was requested while a step was
    /// in flight and that step is still running).
    pub async fn resume(&self, id: &str) -> Result<WorkflowResult, EngineError> {
        let cursor = {
            let mut runs = self.runs.lock().await;
            let entry = runs.get_mut(id).ok_or_else(|| EngineError::UnknownWorkflow {
                workflow_id: id.to_string(),
            })?;
            if entry.state.status != WorkflowStatus::Paused {
                return Err(EngineError::NotPaused {
                    workflow_id: id.to_string(),
                    status: entry.state.status,
                });
            }
            // the pause flipped the status, but the original loop is still
            // driving its in-flight step; a second loop here would execute
            // steps twice
            if entry.loop_active {
                return Err(EngineError::AlreadyRunning {
                    workflow_id: id.to_string(),
                });
            }
            entry.state.status = WorkflowStatus::Running;
            entry.loop_active = true;
            let steps = &entry.workflow.steps;
            match entry.state.current_step_id.as_deref() {
                Some(target) => steps
                    .iter()
                    .position(|s| s.id() == target)
                    .unwrap_or(entry.state.executed_steps.len()),
                None => entry.state.executed_steps.len(),
            }
        };

        tracing::debug!("workflow '{}' resumed at step index {}", id, cursor);
        self.publish(WorkflowEventPayload {
            workflow_id: id.to_string(),
            event_type: WorkflowEventType::Resumed,
            step_id: None,
            data: None,
        })
        .await;

        self.run_loop(id, cursor).await
    }

    /// Undoes executed steps via their compensating callbacks, in reverse
    /// execution order, and resets the workflow to `Pending`.
    ///
    /// With a `step_id`, only steps executed strictly after it are
    /// compensated; the executed list is truncated to end at `step_id` and
    /// resume-style re-execution would continue right after it. Without one,
    /// all executed steps are compensated and the executed list is cleared.
    ///
    /// Compensation is best-effort, not transactional: a failing callback
    /// aborts the remaining compensations in this call and the error names
    /// the step that failed; compensations already applied are kept (the
    /// executed list reflects exactly the steps still considered applied).
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown, the workflow is still running, `step_id`
    /// is not in the executed list, or a compensating callback fails.
    pub async fn rollback(&self, id: &str, step_id: Option<&str>) -> Result<(), EngineError> {
        let (workflow, context, to_compensate) = {
            let runs = self.runs.lock().await;
            let entry = runs.get(id).ok_or_else(|| EngineError::UnknownWorkflow {
                workflow_id: id.to_string(),
            })?;
            if entry.state.status == WorkflowStatus::Running || entry.loop_active {
                return Err(EngineError::AlreadyRunning {
                    workflow_id: id.to_string(),
                });
            }
            let executed = &entry.state.executed_steps;
            let keep = match step_id {
                Some(target) => match executed.iter().position(|s| s == target) {
                    Some(pos) => pos + 1,
                    None => {
                        return Err(EngineError::StepNotExecuted {
                            workflow_id: id.to_string(),
                            step_id: target.to_string(),
                        })
                    }
                },
                None => 0,
            };
            (
                entry.workflow.clone(),
                entry.state.context.clone(),
                executed[keep..].to_vec(),
            )
        };

        for sid in to_compensate.iter().rev() {
            let step = workflow
                .steps
                .iter()
                .find(|s| s.id() == sid.as_str())
                .ok_or_else(|| EngineError::Internal {
                    message: format!("executed step '{}' missing from definition", sid),
                })?;
            if step.supports_rollback() {
                if let Err(cause) = step.rollback(&context).await {
                    let err = EngineError::RollbackFailed {
                        workflow_id: id.to_string(),
                        step_id: sid.clone(),
                        message: format!("{:#}", cause),
                    };
                    let ctx = ErrorContext::new("workflow-engine", "rollback")
                        .with_parameter("workflow_id", id)
                        .with_parameter("step_id", sid.as_str());
                    self.error_handler.handle(&err, ctx);
                    return Err(err);
                }
            }
            // reflect compensation progress immediately: the executed list
            // always names exactly the steps still considered applied
            let mut runs = self.runs.lock().await;
            if let Some(entry) = runs.get_mut(id) {
                entry.state.executed_steps.pop();
            }
        }

        let mut runs = self.runs.lock().await;
        let entry = runs.get_mut(id).ok_or_else(|| EngineError::Internal {
            message: format!("tracked state for '{}' vanished during rollback", id),
        })?;
        entry.state.status = WorkflowStatus::Pending;
        entry.state.finished_at = None;
        entry.state.error = None;
        entry.state.current_step_id = step_id.map(str::to_string);
        tracing::debug!(
            "workflow '{}' rolled back to {}",
            id,
            step_id.unwrap_or("start")
        );
        Ok(())
    }

    /// Current status of `id`. Ids the engine has never seen report
    /// `Pending`; this never fails.
    pub async fn get_status(&self, id: &str) -> WorkflowStatus {
        let runs = self.runs.lock().await;
        runs.get(id)
            .map_or(WorkflowStatus::Pending, |entry| entry.state.status)
    }

    /// Snapshot of the tracked state for `id`, if any.
    pub async fn get_state(&self, id: &str) -> Option<WorkflowState> {
        let runs = self.runs.lock().await;
        runs.get(id).map(|entry| entry.state.clone())
    }

    /// Evicts Completed/Failed entries that finished more than `max_age`
    /// ago. Returns the number of entries removed. Active and pending
    /// entries are never touched.
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = match Utc::now().checked_sub_signed(age) {
            Some(cutoff) => cutoff,
            None => return 0,
        };
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        runs.retain(|_, entry| match entry.state.status {
            WorkflowStatus::Completed | WorkflowStatus::Failed => entry
                .state
                .finished_at
                .map_or(true, |finished| finished > cutoff),
            _ => true,
        });
        before - runs.len()
    }

    async fn run_loop(&self, id: &str, mut cursor: usize) -> Result<WorkflowResult, EngineError> {
        let workflow = {
            let runs = self.runs.lock().await;
            runs.get(id)
                .map(|entry| entry.workflow.clone())
                .ok_or_else(|| EngineError::Internal {
                    message: format!("tracked state for '{}' vanished", id),
                })?
        };

        loop {
            if cursor >= workflow.steps.len() {
                return self.complete(id).await;
            }

            let step = workflow.steps[cursor].clone();

            // pause is only observed here, between steps
            let gate: Result<Value, WorkflowResult> = {
                let mut runs = self.runs.lock().await;
                let entry = runs.get_mut(id).ok_or_else(|| EngineError::Internal {
                    message: format!("tracked state for '{}' vanished", id),
                })?;
                if entry.state.status == WorkflowStatus::Paused {
                    entry.state.current_step_id = Some(step.id().to_string());
                    entry.loop_active = false;
                    Err(make_result(&entry.state, None, None))
                } else {
                    Ok(entry.state.context.clone())
                }
            };
            let context = match gate {
                Ok(context) => context,
                Err(paused) => {
                    tracing::debug!("workflow '{}' paused before step '{}'", id, step.id());
                    self.publish(WorkflowEventPayload {
                        workflow_id: id.to_string(),
                        event_type: WorkflowEventType::Paused,
                        step_id: Some(step.id().to_string()),
                        data: None,
                    })
                    .await;
                    return Ok(paused);
                }
            };

            match self.run_step(step.as_ref(), &context).await {
                Ok(result) if result.success => {
                    {
                        let mut runs = self.runs.lock().await;
                        let entry = runs.get_mut(id).ok_or_else(|| EngineError::Internal {
                            message: format!("tracked state for '{}' vanished", id),
                        })?;
                        entry.state.executed_steps.push(step.id().to_string());
                        if let Some(data) = &result.data {
                            if !data.is_null() {
                                entry.state.context = data.clone();
                            }
                        }
                    }
                    self.publish(WorkflowEventPayload {
                        workflow_id: id.to_string(),
                        event_type: WorkflowEventType::StepCompleted,
                        step_id: Some(step.id().to_string()),
                        data: result.data.clone(),
                    })
                    .await;

                    // explicit jump; an unmatched target falls through to
                    // the next step in array order
                    cursor = result
                        .next_step_id
                        .as_deref()
                        .and_then(|target| workflow.steps.iter().position(|s| s.id() == target))
                        .unwrap_or(cursor + 1);
                }
                Ok(result) => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "step reported failure".to_string());
                    let err = EngineError::StepFailed {
                        workflow_id: id.to_string(),
                        step_id: step.id().to_string(),
                        attempts: 1,
                        message,
                    };
                    return self.fail(id, step.id(), err).await;
                }
                Err((attempts, cause)) => {
                    let err = EngineError::StepFailed {
                        workflow_id: id.to_string(),
                        step_id: step.id().to_string(),
                        attempts,
                        message: format!("{:#}", cause),
                    };
                    return self.fail(id, step.id(), err).await;
                }
            }
        }
    }

    /// Runs one step, retrying transient (`Err`) failures per the step's
    /// policy with the configured backoff. Returns the total attempt count
    /// alongside the final error when the budget is exhausted.
    async fn run_step(
        &self,
        step: &dyn Step,
        context: &Value,
    ) -> Result<StepResult, (u32, anyhow::Error)> {
        let budget = if step.can_retry() { step.max_retries() } else { 0 };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match step.execute(context).await {
                Ok(result) => return Ok(result),
                Err(cause) => {
                    if attempt > budget {
                        return Err((attempt, cause));
                    }
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        "step '{}' attempt {} failed, retrying in {:?}: {:#}",
                        step.id(),
                        attempt,
                        delay,
                        cause
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn complete(&self, id: &str) -> Result<WorkflowResult, EngineError> {
        let (result, data) = {
            let mut runs = self.runs.lock().await;
            let entry = runs.get_mut(id).ok_or_else(|| EngineError::Internal {
                message: format!("tracked state for '{}' vanished", id),
            })?;
            entry.state.status = WorkflowStatus::Completed;
            entry.state.finished_at = Some(Utc::now());
            entry.state.current_step_id = None;
            entry.loop_active = false;
            let data = entry.state.context.clone();
            (make_result(&entry.state, Some(data.clone()), None), data)
        };
        tracing::debug!("workflow '{}' completed", id);
        self.publish(WorkflowEventPayload {
            workflow_id: id.to_string(),
            event_type: WorkflowEventType::Completed,
            step_id: None,
            data: Some(data),
        })
        .await;
        Ok(result)
    }

    async fn fail(
        &self,
        id: &str,
        step_id: &str,
        err: EngineError,
    ) -> Result<WorkflowResult, EngineError> {
        let result = {
            let mut runs = self.runs.lock().await;
            let entry = runs.get_mut(id).ok_or_else(|| EngineError::Internal {
                message: format!("tracked state for '{}' vanished", id),
            })?;
            entry.state.status = WorkflowStatus::Failed;
            entry.state.finished_at = Some(Utc::now());
            entry.state.error = Some(err.to_string());
            entry.loop_active = false;
            make_result(&entry.state, None, Some(err.clone()))
        };
        self.publish(WorkflowEventPayload {
            workflow_id: id.to_string(),
            event_type: WorkflowEventType::Failed,
            step_id: Some(step_id.to_string()),
            data: Some(Value::String(err.to_string())),
        })
        .await;
        let ctx = ErrorContext::new("workflow-engine", "execute")
            .with_parameter("workflow_id", id)
            .with_parameter("step_id", step_id);
        self.error_handler.handle(&err, ctx);
        Ok(result)
    }

    async fn publish(&self, payload: WorkflowEventPayload) {
        match serde_json::to_value(&payload) {
            // lifecycle events are awaited so subscribers observe them in
            // the published order
            Ok(value) => {
                self.bus
                    .emit(Event::new(WORKFLOW_EVENT, value), DispatchMode::Wait)
                    .await;
            }
            Err(err) => tracing::warn!("failed to serialize workflow event: {}", err),
        }
    }
}

fn make_result(
    state: &WorkflowState,
    result: Option<Value>,
    error: Option<EngineError>,
) -> WorkflowResult {
    let end = state.finished_at.unwrap_or_else(Utc::now);
    let duration = (end - state.started_at).to_std().unwrap_or(Duration::ZERO);
    WorkflowResult {
        workflow_id: state.workflow_id.clone(),
        status: state.status,
        result,
        error,
        executed_steps: state.executed_steps.clone(),
        duration,
    }
}

fn validate_workflow(workflow: &Workflow) -> Result<(), EngineError> {
    if workflow.id.trim().is_empty() {
        return Err(EngineError::Validation {
            message: "workflow id must not be empty".to_string(),
        });
    }
    if workflow.name.trim().is_empty() {
        return Err(EngineError::Validation {
            message: format!("workflow '{}' must have a name", workflow.id),
        });
    }
    if workflow.steps.is_empty() {
        return Err(EngineError::Validation {
            message: format!("workflow '{}' must have at least one step", workflow.id),
        });
    }
    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if step.id().trim().is_empty() {
            return Err(EngineError::Validation {
                message: format!("workflow '{}' has a step with an empty id", workflow.id),
            });
        }
        if step.name().trim().is_empty() {
            return Err(EngineError::Validation {
                message: format!("step '{}' must have a name", step.id()),
            });
        }
        if !seen.insert(step.id().to_string()) {
            return Err(EngineError::Validation {
                message: format!(
                    "duplicate step id '{}' in workflow '{}'",
                    step.id(),
                    workflow.id
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
