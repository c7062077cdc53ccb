mod common;

use common::{ok_json, status_response, ScriptedTransport, Step};
use routebind::{
    CallArgs, Client, Error, RetryPolicy, RouteSpec, TransportError, TransportErrorKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client_with(transport: Arc<ScriptedTransport>, policy: Option<RetryPolicy>) -> Client {
    let mut builder = Client::builder("retry-test")
        .base_url("http://example.com")
        .unwrap()
        .route(RouteSpec::new("get_status", "/status"))
        .unwrap()
        .with_transport(transport);
    if let Some(policy) = policy {
        builder = builder.retry_policy(policy);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn succeeds_after_transient_resets_within_budget() {
    common::init_tracing();
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::reset("peer reset")),
        Step::Fail(TransportError::reset("peer reset")),
        Step::Respond(ok_json("{\"up\":true}")),
    ]));
    let client = client_with(
        transport.clone(),
        Some(RetryPolicy::new(3, Duration::from_millis(1))),
    );

    let status = client
        .call("get_status", CallArgs::new())
        .await
        .unwrap()
        .decoded()
        .unwrap();
    assert_eq!(status, json!({"up": true}));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn exhausted_budget_propagates_the_original_error() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::reset("peer reset")),
        Step::Fail(TransportError::reset("peer reset")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = client_with(
        transport.clone(),
        Some(RetryPolicy::new(2, Duration::from_millis(1))),
    );

    let err = client.call("get_status", CallArgs::new()).await.unwrap_err();
    match err {
        Error::Transport(e) => {
            assert_eq!(e.kind(), TransportErrorKind::Reset);
            assert!(e.to_string().contains("peer reset"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn default_policy_is_a_single_attempt() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::timeout("read timed out")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = client_with(transport.clone(), None);

    let err = client.call("get_status", CallArgs::new()).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn non_transient_transport_errors_are_not_retried() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::other("protocol violation")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = client_with(
        transport.clone(),
        Some(RetryPolicy::new(5, Duration::from_millis(1))),
    );

    let err = client.call("get_status", CallArgs::new()).await.unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn unexpected_statuses_are_never_retried() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Respond(status_response(503, "unavailable")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = client_with(
        transport.clone(),
        Some(RetryPolicy::new(5, Duration::from_millis(1))),
    );

    let err = client.call("get_status", CallArgs::new()).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedResponse { .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn each_attempt_rebuilds_the_request() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::connect("refused")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = Client::builder("retry-test")
        .base_url("http://example.com")
        .unwrap()
        .query_param(
            "attempt_token",
            routebind::ValueSource::from_method("attempt_token"),
        )
        .retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
        .route(RouteSpec::new("get_status", "/status"))
        .unwrap()
        .with_transport(transport.clone())
        .build()
        .unwrap();

    client.set_state("attempt_token", "t0");
    client.call("get_status", CallArgs::new()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].url.ends_with("?attempt_token=t0"));
    assert!(requests[1].url.ends_with("?attempt_token=t0"));
}

#[tokio::test]
async fn elapsed_time_covers_all_attempts() {
    let transport = Arc::new(ScriptedTransport::new([
        Step::Fail(TransportError::reset("reset")),
        Step::Respond(ok_json("{}")),
    ]));
    let client = client_with(
        transport.clone(),
        Some(RetryPolicy::new(2, Duration::from_millis(20))),
    );

    client.call("get_status", CallArgs::new()).await.unwrap();
    let elapsed = client.last_elapsed().unwrap();
    assert!(elapsed >= Duration::from_millis(20), "elapsed: {elapsed:?}");
}

#[test]
fn backoff_multiplier_scales_the_delay() {
    let policy = RetryPolicy::new(4, Duration::from_millis(50)).with_backoff(2.0);
    assert_eq!(policy.delay_for(1), Duration::from_millis(50));
    assert_eq!(policy.delay_for(2), Duration::from_millis(100));
    assert_eq!(policy.delay_for(3), Duration::from_millis(200));
}
