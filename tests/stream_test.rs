// tests/stream_test.rs — Integration test: generation over the event stream

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::*;
use plancraft::api::handlers::generation_stream;
use plancraft::api::stream::{create_event_stream, EventChannel, EventStream};
use plancraft::api::types::StreamingEvent;
use plancraft::core::ledger::AttemptStore;
use plancraft::core::orchestrator::GenerationContext;
use plancraft::core::types::{
    AttemptRecord, AttemptStatus, FailureClassification, GenerationInput, GenerationResult,
};
use plancraft::infra::errors::PlanError;
use plancraft::memory::StoreHandle;

fn event_json(event: &StreamingEvent) -> serde_json::Value {
    serde_json::to_value(event).unwrap()
}

async fn collect(stream: EventStream) -> Vec<serde_json::Value> {
    stream
        .map(|event| event_json(&event.unwrap()))
        .collect()
        .await
}

async fn wait_for_terminal(store: &StoreHandle, plan_id: &str) -> AttemptRecord {
    for _ in 0..200 {
        let attempts = store.list_attempts(plan_id).await.unwrap();
        if let Some(a) = attempts
            .into_iter()
            .find(|a| a.status != AttemptStatus::InProgress)
        {
            return a;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("attempt for '{plan_id}' never reached a terminal state");
}

#[tokio::test(start_paused = true)]
async fn test_stream_reports_start_then_complete() {
    let provider = ScriptedProvider::new(Script::Fragments(two_module_fragments(50, 50)));
    let orch = Arc::new(orchestrator_with(provider, Arc::new(sqlite_store()), 3));

    let ctx = GenerationContext::new("plan", "user-1", GenerationInput::new(" Rust ", 5.0));
    let events = collect(generation_stream(orch, ctx, None)).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["type"], "start");
    assert_eq!(events[0]["input"]["topic"], "Rust");
    assert_eq!(events[1]["type"], "complete");
    assert_eq!(events[1]["attemptNumber"], 1);
    assert_eq!(events[1]["modulesCount"], 2);
    assert_eq!(events[1]["tasksCount"], 3);
    assert_eq!(events[1]["modules"][1]["title"], "B");
}

#[tokio::test(start_paused = true)]
async fn test_stream_reports_sanitized_timeout() {
    let provider = ScriptedProvider::new(Script::Hang);
    let orch = Arc::new(orchestrator_with(provider, Arc::new(sqlite_store()), 3));

    let ctx = GenerationContext::new("plan", "user-1", GenerationInput::new("Rust", 5.0));
    let events = collect(generation_stream(orch, ctx, None)).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["type"], "error");
    assert_eq!(events[1]["planId"], "plan");
    assert_eq!(events[1]["code"], "GENERATION_TIMEOUT");
    assert_eq!(events[1]["retryable"], true);
}

#[tokio::test]
async fn test_stream_reports_capped() {
    let provider = ScriptedProvider::new(Script::Reject(|| PlanError::RateLimited {
        provider: "scripted".into(),
        retry_after_ms: 0,
    }));
    let orch = Arc::new(orchestrator_with(provider.clone(), Arc::new(sqlite_store()), 1));

    let ctx = GenerationContext::new("plan", "user-1", GenerationInput::new("Rust", 5.0));
    let events = collect(generation_stream(orch.clone(), ctx.clone(), None)).await;
    assert_eq!(events[1]["code"], "RATE_LIMITED");

    let events = collect(generation_stream(orch, ctx, None)).await;
    assert_eq!(events[1]["type"], "error");
    assert_eq!(events[1]["code"], "ATTEMPT_CAP_REACHED");
    assert_eq!(events[1]["retryable"], false);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_persistence_fault_ends_stream_with_internal_error() {
    let provider = ScriptedProvider::new(Script::Fragments(two_module_fragments(0, 0)));
    let store = FlakyStore {
        inner: sqlite_store(),
        fail_count: false,
        fail_complete: true,
    };
    let orch = Arc::new(orchestrator_with(provider, Arc::new(store), 3));

    let ctx = GenerationContext::new("plan", "user-1", GenerationInput::new("Rust", 5.0));
    let frames: Vec<_> = generation_stream(orch, ctx, None).collect().await;

    assert_eq!(frames.len(), 3);
    let error = event_json(frames[1].as_ref().unwrap());
    assert_eq!(error["code"], "INTERNAL_ERROR");
    assert!(!error.to_string().contains("disk I/O"));
    assert!(frames[2].is_err());
}

#[tokio::test]
async fn test_disconnect_cancels_generation_and_runs_cleanups_once() {
    let provider = ScriptedProvider::new(Script::Hang);
    let store = sqlite_store();
    let orch = Arc::new(orchestrator_with(provider.clone(), Arc::new(store.clone()), 3));

    let cleanups = Arc::new(AtomicUsize::new(0));
    let captured: Arc<Mutex<Option<EventChannel>>> = Arc::new(Mutex::new(None));
    let outcome: Arc<Mutex<Option<GenerationResult>>> = Arc::new(Mutex::new(None));

    let mut stream = {
        let cleanups = cleanups.clone();
        let captured = captured.clone();
        let outcome = outcome.clone();
        create_event_stream(None, move |channel| async move {
            for _ in 0..2 {
                let cleanups = cleanups.clone();
                channel.on_cleanup(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                });
            }
            *captured.lock().unwrap() = Some(channel.clone());

            let ctx = GenerationContext::new("plan", "user-1", GenerationInput::new("Rust", 5.0));
            channel.emit(&StreamingEvent::start(&ctx.plan_id, &ctx.input));
            let result = orch.run(&ctx, Some(channel.signal())).await?;
            channel.emit(&StreamingEvent::failure(&ctx.plan_id, match &result {
                GenerationResult::Failure(f) => f,
                GenerationResult::Success(_) => unreachable!("provider never answers"),
            }));
            *outcome.lock().unwrap() = Some(result);
            Ok(())
        })
    };

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(event_json(&first)["type"], "start");
    let signal = stream.signal().clone();
    drop(stream);

    assert!(signal.is_cancelled());
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);

    let channel = captured.lock().unwrap().clone().unwrap();
    assert!(channel.is_closed());
    assert!(!channel.emit(&StreamingEvent::error("plan", FailureClassification::Timeout)));

    let record = wait_for_terminal(&store, "plan").await;
    assert_eq!(record.status, AttemptStatus::Failure);
    assert_eq!(record.classification, Some(FailureClassification::ProviderError));
    assert!(!record.timed_out);

    let (_, options) = provider.last_call().unwrap();
    assert!(options.signal.is_cancelled());

    // the handler finishing afterwards must not run cleanups a second time
    for _ in 0..200 {
        if outcome.lock().unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(outcome.lock().unwrap().is_some());
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}
