//! Capability dispatch and one-shot rendering.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use actions::test_support::{
    CountingBroker, OneShotScript, ScriptedOneShot, ScriptedStream, collect_frames, events,
};
use actions::{
    Action, Engine, Frame, Outcome, Problem, ProblemKind, Representation, RequestContext,
    Responder, StreamConfig,
};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

async fn execute(
    broker: &Arc<CountingBroker>,
    representation: Representation,
    action: &mut dyn Action,
) -> (Outcome, Vec<Frame>) {
    let engine = Engine::new(broker.clone(), StreamConfig::default());
    let (responder, mut rx) = Responder::channel(8);
    let mut ctx = RequestContext::new(representation, CancellationToken::new());
    let outcome = engine.execute(action, &mut ctx, &responder).await;
    drop(responder);
    (outcome, collect_frames(&mut rx).await)
}

#[tokio::test]
async fn missing_capability_is_not_acceptable_and_runs_no_action_code() {
    let broker = CountingBroker::new();

    let mut stream_only = ScriptedStream::new("ledger").cycle(events(0, 1));
    let stream_calls = stream_only.calls();
    for representation in [Representation::Structured, Representation::Raw] {
        let (outcome, frames) = execute(&broker, representation, &mut stream_only).await;
        assert_eq!(outcome, Outcome::NotAcceptable);
        assert_eq!(frames, vec![Frame::Problem(Problem::not_acceptable())]);
    }
    assert_eq!(stream_calls.load(Ordering::SeqCst), 0);

    let mut json_only = ScriptedOneShot::structured(OneShotScript::Json(serde_json::json!({})));
    let json_calls = json_only.calls();
    for representation in [Representation::EventStream, Representation::Raw] {
        let (outcome, frames) = execute(&broker, representation, &mut json_only).await;
        assert_eq!(outcome, Outcome::NotAcceptable);
        assert_eq!(frames, vec![Frame::Problem(Problem::not_acceptable())]);
    }
    assert_eq!(json_calls.load(Ordering::SeqCst), 0);
    assert_eq!(broker.subscribes(), 0);
}

#[tokio::test]
async fn unacceptable_representation_is_rejected_without_running_the_action() {
    let broker = CountingBroker::new();
    let mut action = ScriptedOneShot::structured(OneShotScript::Json(serde_json::json!({})));
    let calls = action.calls();

    let (outcome, frames) = execute(&broker, Representation::Unacceptable, &mut action).await;

    assert_eq!(outcome, Outcome::NotAcceptable);
    assert_eq!(frames.len(), 1);
    assert!(matches!(&frames[0], Frame::Problem(p) if p.kind == ProblemKind::NotAcceptable));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn structured_success_renders_the_body_once() {
    let broker = CountingBroker::new();
    let body = serde_json::json!({ "sequence": 42 });
    let mut action = ScriptedOneShot::structured(OneShotScript::Json(body.clone()));
    let calls = action.calls();

    let (outcome, frames) = execute(&broker, Representation::Structured, &mut action).await;

    assert_eq!(outcome, Outcome::Rendered);
    assert_eq!(frames, vec![Frame::Json(body)]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.subscribes(), 0);
}

#[tokio::test]
async fn structured_error_renders_the_problem_only() {
    let broker = CountingBroker::new();
    let mut action = ScriptedOneShot::structured(OneShotScript::Fail(Problem::before_history()));

    let (outcome, frames) = execute(&broker, Representation::Structured, &mut action).await;

    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(frames, vec![Frame::Problem(Problem::before_history())]);
}

#[tokio::test]
async fn action_without_body_or_error_is_a_server_error() {
    let broker = CountingBroker::new();
    let mut action = ScriptedOneShot::structured(OneShotScript::Nothing);

    let (outcome, frames) = execute(&broker, Representation::Structured, &mut action).await;

    assert_eq!(outcome, Outcome::Failed);
    assert!(matches!(&frames[..], [Frame::Problem(p)] if p.kind == ProblemKind::ServerError));
}

#[tokio::test]
async fn raw_success_renders_bytes() {
    let broker = CountingBroker::new();
    let mut action = ScriptedOneShot::raw(OneShotScript::Raw(Bytes::from_static(b"\x00\x01")));

    let (outcome, frames) = execute(&broker, Representation::Raw, &mut action).await;

    assert_eq!(outcome, Outcome::Rendered);
    assert_eq!(frames, vec![Frame::Raw(Bytes::from_static(b"\x00\x01"))]);
}

#[tokio::test]
async fn raw_error_renders_the_problem() {
    let broker = CountingBroker::new();
    let mut action = ScriptedOneShot::raw(OneShotScript::Fail(Problem::not_found()));

    let (outcome, frames) = execute(&broker, Representation::Raw, &mut action).await;

    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(frames, vec![Frame::Problem(Problem::not_found())]);
}
