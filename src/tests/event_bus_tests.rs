//! Tests for the event bus.

use super::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn collector() -> (Arc<Mutex<Vec<Value>>>, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    (seen.clone(), seen)
}

#[tokio::test]
async fn emit_delivers_unmodified_payload() {
    let bus = EventBus::new();
    let (seen, sink) = collector();
    bus.subscribe_sync("index-ready", move |event| {
        sink.lock().unwrap().push(event.payload);
    })
    .unwrap();

    let payload = json!({"files": 42, "root": "src"});
    bus.emit(Event::new("index-ready", payload.clone()), DispatchMode::Wait)
        .await;

    assert_eq!(seen.lock().unwrap().as_slice(), &[payload]);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let sub = bus
        .subscribe_sync("rename", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    bus.emit(Event::new("rename", json!({})), DispatchMode::Wait)
        .await;
    sub.unsubscribe();
    bus.emit(Event::new("rename", json!({})), DispatchMode::Wait)
        .await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count("rename"), 0);
}

#[tokio::test]
async fn subscribe_rejects_blank_event_type() {
    let bus = EventBus::new();
    let err = bus.subscribe_sync("  ", |_| {}).unwrap_err();
    assert_eq!(err.code(), "VALIDATION");
}

#[tokio::test]
async fn failing_handler_hits_sink_once_without_blocking_siblings() {
    let bus = EventBus::new();
    let errors = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));

    let errors_sink = errors.clone();
    bus.on_error(move |_| {
        errors_sink.fetch_add(1, Ordering::SeqCst);
    });

    bus.subscribe("search", |_| async { anyhow::bail!("handler exploded") })
        .unwrap();
    let delivered_in_handler = delivered.clone();
    bus.subscribe_sync("search", move |_| {
        delivered_in_handler.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    bus.emit(Event::new("search", json!({})), DispatchMode::Wait)
        .await;

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroy_clears_subscribers_and_silences_emit() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    bus.subscribe_sync("move", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    bus.destroy();
    assert_eq!(bus.subscriber_count("move"), 0);

    bus.emit(Event::new("move", json!({})), DispatchMode::Wait)
        .await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn destroyed_bus_rejects_new_subscriptions() {
    let bus = EventBus::new();
    bus.destroy();

    let err = bus.subscribe_sync("move", |_| {}).unwrap_err();
    assert_eq!(err.code(), "VALIDATION");
    assert_eq!(bus.subscriber_count("move"), 0);
}

#[tokio::test]
async fn sequential_emits_arrive_in_call_order_regardless_of_priority() {
    let bus = EventBus::new();
    let (seen, sink) = collector();
    bus.subscribe_sync("lifecycle", move |event| {
        sink.lock().unwrap().push(event.payload);
    })
    .unwrap();

    bus.emit(
        Event::new("lifecycle", json!(1)).with_priority(EventPriority::Low),
        DispatchMode::Wait,
    )
    .await;
    bus.emit(
        Event::new("lifecycle", json!(2)).with_priority(EventPriority::High),
        DispatchMode::Wait,
    )
    .await;

    assert_eq!(seen.lock().unwrap().as_slice(), &[json!(1), json!(2)]);
}

#[tokio::test]
async fn drain_delivers_queued_events_by_priority_then_fifo() {
    let bus = EventBus::new();
    let (seen, sink) = collector();
    bus.subscribe_sync("lifecycle", move |event| {
        sink.lock().unwrap().push(event.payload);
    })
    .unwrap();

    bus.enqueue(Event::new("lifecycle", json!("low")).with_priority(EventPriority::Low));
    bus.enqueue(Event::new("lifecycle", json!("high-1")).with_priority(EventPriority::High));
    bus.enqueue(Event::new("lifecycle", json!("normal")));
    bus.enqueue(Event::new("lifecycle", json!("high-2")).with_priority(EventPriority::High));

    bus.drain(DispatchMode::Wait).await;

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[json!("high-1"), json!("high-2"), json!("normal"), json!("low")]
    );
}

#[tokio::test]
async fn error_sink_last_registration_wins() {
    let bus = EventBus::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let sink = first.clone();
    bus.on_error(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    let sink = second.clone();
    bus.on_error(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    bus.subscribe("fail", |_| async { anyhow::bail!("nope") })
        .unwrap();
    bus.emit(Event::new("fail", json!({})), DispatchMode::Wait)
        .await;

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}
