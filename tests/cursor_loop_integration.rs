//! End-to-end behaviour of the cursor loop through the registry, the
//! controller and the handle.

use ceaseless::prelude::*;
use ceaseless::sources::cursor::CursorLoop;
use std::time::Duration;

fn create(params: Params) -> (ExecutionController, ExecutionHandle) {
    ExecutionRegistry::with_builtins()
        .create("cursor_loop", params, ExecutionConfig::default())
        .unwrap()
}

fn four_positions() -> Params {
    Params::new().with("length", 4).with("interval", 0.0)
}

/// Cursor values from every batch already queued on `sub`.
fn queued_cursors(sub: &mut Subscription) -> Vec<i64> {
    let mut cursors = Vec::new();
    while let Some(batch) = sub.try_next_batch() {
        if let Some(cursor) = batch.value("cursor").and_then(Value::as_i64) {
            cursors.push(cursor);
        }
    }
    cursors
}

#[tokio::test]
async fn test_three_iterations_walk_forward() {
    let (mut controller, handle) = create(four_positions());
    let mut sub = handle.subscribe().unwrap();

    assert!(controller.start().await);
    for _ in 0..3 {
        assert!(controller.iterate().await);
    }
    assert_eq!(queued_cursors(&mut sub), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_direction_signal_reverses_and_wraps() {
    let (mut controller, handle) = create(four_positions());
    let mut sub = handle.subscribe().unwrap();

    controller.start().await;
    controller.iterate().await;
    handle.send(Signal::custom("direction"));
    controller.iterate().await;
    controller.iterate().await;

    assert_eq!(queued_cursors(&mut sub), vec![1, 0, 3]);
    assert_eq!(handle.state(), ExecutionState::Running);
    assert!(!controller.logic::<CursorLoop>().unwrap().is_forward());
}

#[tokio::test]
async fn test_coalesced_signals_only_deliver_the_last() {
    let (mut controller, handle) = create(four_positions());
    controller.start().await;
    controller.iterate().await;

    handle.send(Signal::custom("direction"));
    handle.stop();
    assert!(!controller.iterate().await);

    let termination = controller.terminate().await;
    assert!(termination.is_completed());
    // the direction flip was overwritten before it was read
    assert!(controller.logic::<CursorLoop>().unwrap().is_forward());
}

#[tokio::test]
async fn test_stop_produces_named_result() {
    let (mut controller, handle) = create(four_positions());
    let mut sub = handle.subscribe().unwrap();
    controller.start().await;
    controller.iterate().await;
    controller.iterate().await;
    handle.stop();
    controller.iterate().await;

    let termination = controller.terminate().await;
    let result = termination.result().unwrap();
    assert_eq!(result.get("cursor"), Some(&Value::Int(2)));
    assert_eq!(result.get("iterations"), Some(&Value::Int(2)));

    let mut last = None;
    while let Some(batch) = sub.next_batch().await {
        last = Some(batch);
    }
    let last = last.unwrap();
    assert_eq!(last.value("iterations"), Some(&Value::Int(2)));
    assert!(last.value("error").is_none());
}

#[tokio::test]
async fn test_unregistered_signal_fails() {
    let (mut controller, handle) = create(four_positions());
    let mut sub = handle.subscribe().unwrap();
    controller.start().await;
    handle.send(Signal::custom("teleport").with_payload("7"));
    assert!(!controller.iterate().await);

    let termination = controller.terminate().await;
    assert_eq!(termination.state(), ExecutionState::Failed);
    assert_eq!(handle.state(), ExecutionState::Failed);

    let batch = sub.next_batch().await.unwrap();
    let error = batch.value("error").and_then(Value::as_str).unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("teleport"));
    assert!(sub.next_batch().await.is_none());
}

#[tokio::test]
async fn test_spawned_loop_pauses_then_stops() {
    let params = Params::new().with("length", 4).with("interval", 0.01);
    let (controller, handle) = create(params);
    let mut sub = handle.subscribe().unwrap();
    let task = controller.spawn();

    assert!(sub.next_batch().await.is_some());
    handle.pause();
    assert_eq!(
        handle.wait_for_state(ExecutionState::Paused).await,
        ExecutionState::Paused
    );
    handle.stop();

    let termination = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("execution did not stop")
        .unwrap();
    assert!(termination.is_completed());
    assert_eq!(handle.wait_terminal().await, ExecutionState::Completed);
}

#[tokio::test]
async fn test_missing_length_is_rejected_before_start() {
    let err = ExecutionRegistry::with_builtins()
        .create("cursor_loop", Params::new(), ExecutionConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ExecutionError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_zero_length_fails_during_setup() {
    let (mut controller, _handle) = create(Params::new().with("length", 0));
    assert!(!controller.start().await);
    let termination = controller.terminate().await;
    assert!(matches!(
        termination.error(),
        Some(ExecutionError::InvalidInput { .. })
    ));
    assert_eq!(controller.iteration(), 0);
}

#[tokio::test]
async fn test_second_subscriber_is_refused_until_first_drops() {
    let (_controller, handle) = create(four_positions());
    let first = handle.subscribe().unwrap();
    assert!(matches!(
        handle.subscribe(),
        Err(ExecutionError::AlreadySubscribed)
    ));
    drop(first);
    assert!(handle.subscribe().is_ok());
}

#[tokio::test]
async fn test_unrepresentable_interval_fails_as_invalid_input() {
    let params = Params::new().with("length", 4).with("interval", 1e30);
    let (mut controller, _handle) = create(params);
    let termination = controller.run().await;
    assert!(matches!(
        termination.error(),
        Some(ExecutionError::InvalidInput { name, .. }) if name == "interval"
    ));
}

#[tokio::test]
async fn test_backward_travel_over_full_range_length() {
    let params = Params::new()
        .with("length", u64::MAX)
        .with("forward", false)
        .with("start", 5)
        .with("interval", 0.0);
    let (mut controller, handle) = create(params);
    let mut sub = handle.subscribe().unwrap();
    assert!(controller.start().await);
    assert!(controller.iterate().await);
    assert_eq!(
        sub.try_next_batch().unwrap().value("cursor"),
        Some(&Value::Int(4))
    );
}
