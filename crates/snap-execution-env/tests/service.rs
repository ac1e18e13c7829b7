//! End-to-end tests driving `ExecutionEnvironmentService` against the
//! in-process isolate container (no `snap-worker` child process needed).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use snap_execution_env::{ExecutionEnvironmentService, ServiceBuilder, ServiceEvent};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

struct CountingProviderSetup {
    calls: Arc<AtomicUsize>,
}

impl snap_execution_env::SnapProviderSetup for CountingProviderSetup {
    fn setup(&self, _snap_id: &str, _jsonrpc: snap_protocol::Substream) -> BoxFuture<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

fn service() -> (ExecutionEnvironmentService, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = ServiceBuilder::new()
        .with_unresponsive_polling_interval(Duration::from_millis(200))
        .with_unresponsive_timeout(Duration::from_millis(200))
        .with_create_window_timeout(Duration::from_secs(5))
        .build();
    let provider_setup = Arc::new(CountingProviderSetup {
        calls: calls.clone(),
    });
    (
        ExecutionEnvironmentService::new(config, provider_setup),
        calls,
    )
}

#[tokio::test]
async fn execute_snap_then_hook_round_trips_through_the_registered_handler() {
    let (service, calls) = service();

    service
        .execute_snap(
            "A".to_string(),
            "wallet.registerRpcMessageHandler(async (origin, request) => request.method);"
                .to_string(),
        )
        .await
        .expect("execute_snap should succeed");

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let hook = service
        .get_rpc_message_handler("A")
        .await
        .expect("hook should exist after a successful execute");

    let result = hook("origin1".to_string(), serde_json::json!({"method": "hello"}))
        .await
        .expect("snapRpc should resolve");
    assert_eq!(result, serde_json::json!("hello"));

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn duplicate_execute_snap_is_rejected_without_disturbing_existing_state() {
    let (service, _calls) = service();

    service
        .execute_snap("A".to_string(), "wallet.registerRpcMessageHandler(async () => 1);".to_string())
        .await
        .unwrap();

    let second = service
        .execute_snap("A".to_string(), "wallet.registerRpcMessageHandler(async () => 2);".to_string())
        .await;
    assert!(matches!(
        second,
        Err(snap_execution_env::ServiceError::AlreadyExecuting(ref id)) if id == "A"
    ));

    // The original hook still answers - the rejected call didn't tear it down.
    let hook = service.get_rpc_message_handler("A").await.unwrap();
    let result = hook("o".to_string(), serde_json::Value::Null).await.unwrap();
    assert_eq!(result, serde_json::json!(1));

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn execute_snap_throw_rejects_and_leaves_no_mapping_or_hook() {
    let (service, calls) = service();

    let outcome = service
        .execute_snap("A".to_string(), "throw new Error('boom');".to_string())
        .await;
    assert!(outcome.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(service.get_rpc_message_handler("A").await.is_none());

    // The snapId is free again: a fresh attempt is not rejected as a duplicate.
    let retry = service
        .execute_snap("A".to_string(), "wallet.registerRpcMessageHandler(async () => 1);".to_string())
        .await;
    assert!(retry.is_ok());

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn terminate_snap_removes_its_hook_and_mapping_only() {
    let (service, _calls) = service();

    service
        .execute_snap("A".to_string(), "wallet.registerRpcMessageHandler(async () => 1);".to_string())
        .await
        .unwrap();
    service
        .execute_snap("B".to_string(), "wallet.registerRpcMessageHandler(async () => 2);".to_string())
        .await
        .unwrap();

    service.terminate_snap("A").await.unwrap();

    assert!(service.get_rpc_message_handler("A").await.is_none());
    assert!(service.get_rpc_message_handler("B").await.is_some());

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn terminate_snap_for_unknown_snap_is_rejected() {
    let (service, _calls) = service();
    let outcome = service.terminate_snap("ghost").await;
    assert!(matches!(
        outcome,
        Err(snap_execution_env::ServiceError::UnknownSnap(ref id)) if id == "ghost"
    ));
}

#[tokio::test]
async fn terminate_all_snaps_clears_every_hook_while_three_snaps_are_live() {
    let (service, _calls) = service();

    for id in ["A", "B", "C"] {
        service
            .execute_snap(id.to_string(), "wallet.registerRpcMessageHandler(async () => 1);".to_string())
            .await
            .unwrap();
    }

    let mut events = service.subscribe();

    service.terminate_all_snaps().await;

    for id in ["A", "B", "C"] {
        assert!(service.get_rpc_message_handler(id).await.is_none());
    }

    // An orderly shutdown publishes no unresponsive/unhandled-error events.
    let drained = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(drained.is_err(), "terminate_all_snaps must not publish any events");
}

#[tokio::test]
async fn a_second_registration_in_the_same_snap_throws_inside_the_compartment() {
    let (service, _calls) = service();

    let outcome = service
        .execute_snap(
            "A".to_string(),
            r#"
            wallet.registerRpcMessageHandler(async () => 1);
            wallet.registerRpcMessageHandler(async () => 2);
            "#
            .to_string(),
        )
        .await;

    assert!(outcome.is_err(), "double registration must fail evaluation");
    assert!(service.get_rpc_message_handler("A").await.is_none());
}

#[tokio::test]
async fn snap_rpc_for_a_handler_that_throws_rejects_with_its_message() {
    let (service, _calls) = service();

    service
        .execute_snap(
            "A".to_string(),
            "wallet.registerRpcMessageHandler(async () => { throw new Error('handler failed'); });".to_string(),
        )
        .await
        .unwrap();

    let hook = service.get_rpc_message_handler("A").await.unwrap();
    let result = hook("o".to_string(), serde_json::Value::Null).await;
    assert!(result.is_err());

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn two_pings_in_sequence_on_a_healthy_isolate_both_resolve() {
    let (service, _calls) = service();

    service
        .execute_snap("A".to_string(), "wallet.registerRpcMessageHandler(async () => 1);".to_string())
        .await
        .unwrap();

    // Nothing in the public API exposes a raw ping, but a healthy snap must
    // survive two liveness-poll intervals without going unresponsive.
    let mut events = service.subscribe();
    let observed = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
    assert!(
        observed.is_err(),
        "a healthy snap must not be reported unresponsive"
    );

    service.terminate_all_snaps().await;
}

#[tokio::test]
async fn a_timer_callback_that_throws_is_published_as_an_unhandled_error_exactly_once() {
    let (service, _calls) = service();

    let mut events = service.subscribe();

    service
        .execute_snap(
            "A".to_string(),
            "setTimeout(() => { throw new Error('async boom'); }, 0);".to_string(),
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("an unhandled-error event should be published")
        .unwrap();
    match event {
        ServiceEvent::UnhandledError { snap_id, message } => {
            assert_eq!(snap_id, "A");
            assert!(message.contains("async boom"), "got: {message}");
        }
        other => panic!("expected UnhandledError, got {other:?}"),
    }

    // It fires exactly once: nothing else arrives shortly after.
    let second = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert!(second.is_err(), "unhandled error must not be published twice");

    service.terminate_all_snaps().await;
}
