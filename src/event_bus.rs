//! In-process publish/subscribe bus for lifecycle notifications.
//!
//! Handlers are registered per event type and invoked in subscription order.
//! A failing handler never blocks its siblings and never propagates to the
//! emitter; failures go to a process-wide error sink instead.
//!
//! # Ordering contract
//!
//! `emit` dispatches immediately: sequentially awaited emits are delivered
//! strictly in call order, regardless of the priority declared on the event.
//! Priority only matters for events that are queued but not yet drained at
//! the same instant: [`EventBus::enqueue`] collects such events and
//! [`EventBus::drain`] delivers them highest-priority-first (FIFO within a
//! priority class).

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Relative urgency of a queued event. Meaningless for direct `emit` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    High,
    Normal,
    Low,
}

impl EventPriority {
    fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// A notification published on the bus.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub priority: EventPriority,
}

impl Event {
    /// Creates a normal-priority event stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            priority: EventPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// How `emit` treats asynchronous handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Handlers are spawned onto the runtime; `emit` returns without waiting.
    FireAndForget,
    /// Handlers run in parallel and `emit` resolves once all have finished.
    Wait,
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ErrorSink = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    subscribers: HashMap<String, Vec<Subscriber>>,
    pending: Vec<QueuedEvent>,
    error_sink: Option<ErrorSink>,
    next_id: u64,
    next_seq: u64,
    destroyed: bool,
}

struct QueuedEvent {
    seq: u64,
    event: Event,
}

/// Handle returned by [`EventBus::subscribe`]. Call
/// [`unsubscribe`](Subscription::unsubscribe) to stop delivery; dropping the
/// handle without calling it leaves the handler registered.
#[derive(Debug)]
pub struct Subscription {
    inner: Weak<Mutex<BusInner>>,
    event_type: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = lock(&inner);
            if let Some(subs) = inner.subscribers.get_mut(&self.event_type) {
                subs.retain(|s| s.id != self.id);
                if subs.is_empty() {
                    inner.subscribers.remove(&self.event_type);
                }
            }
        }
    }
}

/// Priority-aware publish/subscribe dispatcher.
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(inner: &Mutex<BusInner>) -> std::sync::MutexGuard<'_, BusInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner::default())),
        }
    }

    /// Registers an asynchronous handler for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `event_type` is empty or blank, or if
    /// the bus has been destroyed (a handler registered then could never
    /// fire).
    pub fn subscribe<F, Fut>(&self, event_type: &str, handler: F) -> Result<Subscription, EngineError>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if event_type.trim().is_empty() {
            return Err(EngineError::Validation {
                message: "event type must not be empty".to_string(),
            });
        }
        let boxed: Handler = Arc::new(move |event| handler(event).boxed());
        let mut inner = lock(&self.inner);
        if inner.destroyed {
            return Err(EngineError::Validation {
                message: "event bus has been destroyed".to_string(),
            });
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(Subscriber { id, handler: boxed });
        Ok(Subscription {
            inner: Arc::downgrade(&self.inner),
            event_type: event_type.to_string(),
            id,
        })
    }

    /// Registers a synchronous handler. Runs inline on the emitter's task.
    pub fn subscribe_sync<F>(&self, event_type: &str, handler: F) -> Result<Subscription, EngineError>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.subscribe(event_type, move |event| {
            handler(event);
            async { Ok(()) }
        })
    }

    /// Registers the process-wide error sink. Last registration wins.
    pub fn on_error<F>(&self, sink: F)
    where
        F: Fn(anyhow::Error) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.error_sink = Some(Arc::new(sink));
    }

    /// Delivers `event` to all handlers registered for its type, in
    /// subscription order. No-op after [`destroy`](EventBus::destroy).
    ///
    /// Handler failures are forwarded to the error sink and never surface
    /// here. With [`DispatchMode::Wait`] all handlers are awaited in
    /// parallel before this returns; with [`DispatchMode::FireAndForget`]
    /// they run without backpressure on the caller.
    pub async fn emit(&self, event: Event, mode: DispatchMode) {
        let (handlers, sink) = {
            let inner = lock(&self.inner);
            if inner.destroyed {
                return;
            }
            let handlers: Vec<Handler> = inner
                .subscribers
                .get(&event.event_type)
                .map(|subs| subs.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default();
            (handlers, inner.error_sink.clone())
        };

        match mode {
            DispatchMode::Wait => {
                let calls = handlers.into_iter().map(|handler| {
                    let event = event.clone();
                    let sink = sink.clone();
                    async move {
                        if let Err(err) = handler(event).await {
                            forward_error(sink.as_ref(), err);
                        }
                    }
                });
                join_all(calls).await;
            }
            DispatchMode::FireAndForget => {
                for handler in handlers {
                    let event = event.clone();
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handler(event).await {
                            forward_error(sink.as_ref(), err);
                        }
                    });
                }
            }
        }
    }

    /// Queues an event for a later [`drain`](EventBus::drain). Queued events
    /// are the only place where [`EventPriority`] affects delivery order.
    pub fn enqueue(&self, event: Event) {
        let mut inner = lock(&self.inner);
        if inner.destroyed {
            return;
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.pending.push(QueuedEvent { seq, event });
    }

    /// Delivers all queued events, highest priority first; events of equal
    /// priority keep their enqueue order.
    pub async fn drain(&self, mode: DispatchMode) {
        let mut batch = {
            let mut inner = lock(&self.inner);
            std::mem::take(&mut inner.pending)
        };
        batch.sort_by_key(|q| (q.event.priority.rank(), q.seq));
        for queued in batch {
            self.emit(queued.event, mode).await;
        }
    }

    /// Number of handlers currently registered for `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        let inner = lock(&self.inner);
        inner
            .subscribers
            .get(event_type)
            .map_or(0, |subs| subs.len())
    }

    /// Unsubscribes everyone and drops queued events; subsequent `emit` and
    /// `enqueue` calls become no-ops.
    pub fn destroy(&self) {
        let mut inner = lock(&self.inner);
        inner.subscribers.clear();
        inner.pending.clear();
        inner.error_sink = None;
        inner.destroyed = true;
    }
}

fn forward_error(sink: Option<&ErrorSink>, err: anyhow::Error) {
    match sink {
        Some(sink) => sink(err),
        None => tracing::warn!("unhandled event handler error: {:#}", err),
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
