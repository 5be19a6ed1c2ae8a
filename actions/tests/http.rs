//! HTTP responses produced by `respond`.

use std::sync::Arc;
use std::time::Duration;

use actions::test_support::{
    CountingBroker, OneShotScript, ScriptedOneShot, ScriptedStream, events,
};
use actions::{Broker, Engine, Problem, StreamConfig, Topic, respond};
use axum::body::to_bytes;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

fn engine(broker: &Arc<CountingBroker>) -> Arc<Engine> {
    Arc::new(Engine::new(broker.clone(), StreamConfig::default()))
}

fn accept(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(value));
    headers
}

fn content_type(response: &Response) -> &str {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn structured_response_is_hal_json() {
    let broker = CountingBroker::new();
    let action =
        ScriptedOneShot::structured(OneShotScript::Json(serde_json::json!({"ok": true})));

    let response = respond(engine(&broker), &accept("application/json"), action).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/hal+json");
    assert_eq!(body_text(response).await, r#"{"ok":true}"#);
}

#[tokio::test]
async fn unsupported_accept_is_406_problem() {
    let broker = CountingBroker::new();
    let action = ScriptedOneShot::structured(OneShotScript::Json(serde_json::json!({})));

    let response = respond(engine(&broker), &accept("text/html"), action).await;

    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(content_type(&response), "application/problem+json");
    let body: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("problem json");
    assert_eq!(body["type"], "not_acceptable");
}

#[tokio::test]
async fn stream_setup_error_is_a_plain_problem_response() {
    let broker = CountingBroker::new();
    let action =
        ScriptedStream::new("ledger").failing_setup(Problem::bad_request("limit", "too big"));

    let response = respond(engine(&broker), &accept("text/event-stream"), action).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(content_type(&response), "application/problem+json");
    assert!(!body_text(response).await.contains("event: open"));
}

#[tokio::test]
async fn limited_stream_is_served_as_server_sent_events() {
    let broker = CountingBroker::new();
    let action = ScriptedStream::new("ledger").with_limit(2).cycle(events(0, 2));

    let response = respond(engine(&broker), &accept("text/event-stream"), action).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(content_type(&response).starts_with("text/event-stream"));
    let body = body_text(response).await;
    assert!(body.contains(r#"data: {"n":0}"#), "body: {body}");
    assert!(body.contains("id: 1"), "body: {body}");
    assert!(!body.contains("event: open"), "body: {body}");
}

#[tokio::test]
async fn open_stream_writes_preamble_with_retry_hint() {
    let broker = CountingBroker::new();
    let engine = Arc::new(Engine::new(
        broker.clone(),
        StreamConfig {
            retry: Duration::from_millis(2500),
            idle_interval: Duration::from_secs(1),
        },
    ));
    // Second pass fails in-band, which closes the stream.
    let action = ScriptedStream::new("ledger")
        .cycle(events(0, 1))
        .failing_cycle(Vec::new(), Problem::server_error("boom"))
        .on_cycle({
            let broker = broker.clone();
            move |cycle, _| {
                if cycle == 1 {
                    broker.publish(&Topic::new("ledger"));
                }
            }
        });

    let response = respond(engine, &accept("text/event-stream"), action).await;
    let body = body_text(response).await;

    assert!(body.contains("retry: 2500"), "body: {body}");
    assert!(body.contains("event: open"), "body: {body}");
    assert!(body.contains("event: error"), "body: {body}");
    assert!(body.contains("server_error"), "body: {body}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_response_cancels_the_stream() {
    let broker = CountingBroker::new();
    let action = ScriptedStream::new("ledger").cycle(events(0, 1));

    let response = respond(engine(&broker), &accept("text/event-stream"), action).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(broker.subscribes(), 1);
    drop(response);

    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.open() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription released after disconnect");
    assert_eq!(broker.unsubscribes(), 1);
}
