//! Trigger dispatch behavior through the full engine: idempotent
//! creation, worker dispatch, retries, cancellation and re-arming.

use std::time::Duration;

use kanri::store::DomainEvent;
use kanri::trigger::{ExecutionOutcome, RetryConfig, TriggerStatus, TriggerType};

use crate::fixtures::{engine, no_config, task_with_hours, ScriptedExecutor};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(4),
    }
}

/// Creating the same trigger twice returns the same record, never two.
#[test]
fn test_trigger_creation_idempotent() {
    let engine = engine();
    let task = task_with_hours(&engine, "build", 1.0);

    let first = engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();
    let second = engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();

    assert!(!first.already_exists);
    assert!(second.already_exists);
    assert_eq!(first.trigger.id, second.trigger.id);
    assert_eq!(engine.list_triggers(&task.id).len(), 1);
}

/// The worker moves a pending trigger through dispatched to succeeded.
#[tokio::test]
async fn test_worker_dispatches_to_success() {
    let engine = engine();
    let task = task_with_hours(&engine, "build", 1.0);
    let created = engine
        .create_workflow_trigger(&task.id, TriggerType::Webhook, no_config())
        .unwrap();

    let executor = ScriptedExecutor::succeeding();
    let worker = engine
        .trigger_worker(executor.clone())
        .with_retry_config(fast_retry());

    let handled = worker.drain_pending().await;
    assert_eq!(handled, 1);
    assert_eq!(executor.calls(), vec![created.trigger.id]);

    let triggers = engine.list_triggers(&task.id);
    assert_eq!(triggers[0].status, TriggerStatus::Succeeded);
    assert_eq!(triggers[0].attempts, 1);
}

/// Transient failures are retried with backoff; permanent ones are not.
#[tokio::test]
async fn test_worker_retry_semantics() {
    let engine = engine();
    let flaky = task_with_hours(&engine, "flaky", 1.0);
    engine
        .create_workflow_trigger(&flaky.id, TriggerType::Webhook, no_config())
        .unwrap();

    let executor = ScriptedExecutor::with_script(vec![
        ExecutionOutcome::TransientFailure("connection reset".to_string()),
        ExecutionOutcome::Success,
    ]);
    let worker = engine
        .trigger_worker(executor.clone())
        .with_retry_config(fast_retry());
    worker.drain_pending().await;

    let triggers = engine.list_triggers(&flaky.id);
    assert_eq!(triggers[0].status, TriggerStatus::Succeeded);
    assert_eq!(triggers[0].attempts, 2);

    // Permanent failure: one attempt, recorded reason
    let broken = task_with_hours(&engine, "broken", 1.0);
    engine
        .create_workflow_trigger(&broken.id, TriggerType::Webhook, no_config())
        .unwrap();
    let executor = ScriptedExecutor::with_script(vec![ExecutionOutcome::PermanentFailure(
        "404 not found".to_string(),
    )]);
    let worker = engine
        .trigger_worker(executor.clone())
        .with_retry_config(fast_retry());
    worker.drain_pending().await;

    let triggers = engine.list_triggers(&broken.id);
    assert_eq!(triggers[0].status, TriggerStatus::Failed);
    assert_eq!(triggers[0].failure_reason.as_deref(), Some("404 not found"));
    assert_eq!(triggers[0].attempts, 1);
    assert_eq!(executor.call_count(), 1);
}

/// A failed dispatch never touches the owning task.
#[tokio::test]
async fn test_dispatch_failure_isolated_from_task() {
    let engine = engine();
    let task = task_with_hours(&engine, "isolated", 1.0);
    engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();

    let executor = ScriptedExecutor::with_script(vec![ExecutionOutcome::PermanentFailure(
        "runner offline".to_string(),
    )]);
    let worker = engine
        .trigger_worker(executor)
        .with_retry_config(fast_retry());
    worker.drain_pending().await;

    let after = engine.get_task(&task.id).unwrap();
    assert_eq!(after.version, 1);
    assert_eq!(after.status, task.status);
}

/// A cancelled trigger is skipped by the worker; a failed one can be
/// re-armed with a fresh record.
#[tokio::test]
async fn test_cancel_then_rearm() {
    let engine = engine();
    let task = task_with_hours(&engine, "restartable", 1.0);

    let created = engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();
    let cancelled = engine.cancel_trigger(&created.trigger.id).unwrap();
    assert_eq!(cancelled.status, TriggerStatus::Failed);
    assert_eq!(cancelled.failure_reason.as_deref(), Some("cancelled"));

    let executor = ScriptedExecutor::succeeding();
    let worker = engine
        .trigger_worker(executor.clone())
        .with_retry_config(fast_retry());
    assert_eq!(worker.drain_pending().await, 0);
    assert_eq!(executor.call_count(), 0);

    // Re-arm: new record, old one preserved for audit
    let rearmed = engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();
    assert!(!rearmed.already_exists);
    assert_ne!(rearmed.trigger.id, created.trigger.id);
    assert_eq!(engine.list_triggers(&task.id).len(), 2);

    worker.drain_pending().await;
    let triggers = engine.list_triggers(&task.id);
    assert_eq!(triggers[1].status, TriggerStatus::Succeeded);
}

/// The run loop processes pending triggers and stops on cancellation.
#[tokio::test]
async fn test_worker_run_loop_processes_and_stops() {
    let engine = engine();
    let task = task_with_hours(&engine, "looped", 1.0);
    engine
        .create_workflow_trigger(&task.id, TriggerType::Webhook, no_config())
        .unwrap();

    let executor = ScriptedExecutor::succeeding();
    let worker = engine
        .trigger_worker(executor.clone())
        .with_retry_config(fast_retry())
        .with_poll_interval(Duration::from_millis(5));
    let token = worker.shutdown_token();

    let handle = tokio::spawn(async move { worker.run().await });

    // Wait until the trigger has been handled
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if executor.call_count() > 0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker never dispatched the trigger"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker did not stop after cancellation")
        .unwrap();

    let triggers = engine.list_triggers(&task.id);
    assert_eq!(triggers[0].status, TriggerStatus::Succeeded);
}

/// Trigger lifecycle events reach subscribers.
#[tokio::test]
async fn test_trigger_events_published() {
    let engine = engine();
    let task = task_with_hours(&engine, "observed", 1.0);
    let rx = engine.subscribe();

    let created = engine
        .create_workflow_trigger(&task.id, TriggerType::Codegen, no_config())
        .unwrap();
    let worker = engine
        .trigger_worker(ScriptedExecutor::succeeding())
        .with_retry_config(fast_retry());
    worker.drain_pending().await;

    let events: Vec<DomainEvent> = rx.try_iter().collect();
    assert!(events.contains(&DomainEvent::TriggerCreated {
        trigger_id: created.trigger.id,
        task_id: task.id,
    }));
    assert!(events.contains(&DomainEvent::TriggerStatusChanged {
        trigger_id: created.trigger.id,
        from: TriggerStatus::Pending,
        to: TriggerStatus::Dispatched,
    }));
    assert!(events.contains(&DomainEvent::TriggerStatusChanged {
        trigger_id: created.trigger.id,
        from: TriggerStatus::Dispatched,
        to: TriggerStatus::Succeeded,
    }));
}
