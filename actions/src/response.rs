//! Response sink and the HTTP adapter built on it.
//!
//! The engine never touches the transport directly. It emits [`Frame`]s into
//! a [`Responder`]; [`respond`] runs the engine on its own task and decides
//! the shape of the HTTP response from the first frame it sees.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body as HttpBody;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::action::Action;
use crate::context::RequestContext;
use crate::engine::Engine;
use crate::negotiate::{MIME_HAL, MIME_RAW, negotiate};
use crate::problem::{MIME_PROBLEM, Problem};
use crate::stream::Event;

/// Frames buffered between the engine task and the HTTP body.
const FRAME_BUFFER: usize = 16;

/// One unit of output emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// One-shot error response.
    Problem(Problem),
    /// One-shot JSON document.
    Json(serde_json::Value),
    /// One-shot raw payload.
    Raw(Bytes),
    /// Keepalive and reconnect hint written after each successful stream cycle.
    Preamble { retry: Duration },
    /// A streamed item.
    Event(Event),
    /// An error delivered on an already open stream.
    StreamError(Problem),
}

/// The receiving side of the response went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response receiver disconnected")]
pub struct Disconnected;

/// Sink the engine writes frames into.
#[derive(Debug, Clone)]
pub struct Responder {
    tx: mpsc::Sender<Frame>,
}

impl Responder {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn send(&self, frame: Frame) -> Result<(), Disconnected> {
        self.tx.send(frame).await.map_err(|_| Disconnected)
    }
}

/// Execute `action` for a request with `headers` and build the HTTP response.
///
/// The engine runs on a spawned task. For event streams, the returned body
/// owns the request's cancellation token: dropping the body (the client
/// disconnected) cancels the request.
pub async fn respond<A>(engine: Arc<Engine>, headers: &HeaderMap, mut action: A) -> Response
where
    A: Action + 'static,
{
    let representation = negotiate(headers);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let (responder, mut rx) = Responder::channel(FRAME_BUFFER);

    tokio::spawn(async move {
        let mut ctx = RequestContext::new(representation, cancel);
        let outcome = engine.execute(&mut action, &mut ctx, &responder).await;
        debug!(?outcome, "action executed");
    });

    let Some(first) = rx.recv().await else {
        warn!("action task ended without a response");
        return problem_response(&Problem::server_error("the action produced no response"));
    };

    match first {
        Frame::Problem(problem) => problem_response(&problem),
        Frame::Json(json) => typed_response(StatusCode::OK, MIME_HAL, json.to_string()),
        Frame::Raw(bytes) => typed_response(StatusCode::OK, MIME_RAW, bytes),
        frame @ (Frame::Preamble { .. } | Frame::Event(_) | Frame::StreamError(_)) => {
            stream_response(frame, rx, guard).into_response()
        }
    }
}

/// Render a problem as a one-shot `application/problem+json` response.
pub fn problem_response(problem: &Problem) -> Response {
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::to_string(problem) {
        Ok(json) => typed_response(status, MIME_PROBLEM, json),
        Err(err) => {
            warn!(error = %err, "failed to serialize problem");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn typed_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<HttpBody>,
) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn stream_response(
    first: Frame,
    mut rx: mpsc::Receiver<Frame>,
    guard: DropGuard,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = async_stream::stream! {
        // Dropping the stream (client gone) drops the guard and cancels the request.
        let _guard = guard;
        let mut next = Some(first);
        while let Some(frame) = next {
            if let Some(event) = sse_event(frame) {
                yield Ok(event);
            }
            next = rx.recv().await;
        }
    };
    Sse::new(stream)
}

/// Convert a frame into its SSE wire form.
pub fn sse_event(frame: Frame) -> Option<SseEvent> {
    match frame {
        Frame::Preamble { retry } => Some(
            SseEvent::default()
                .retry(retry)
                .event("open")
                .data("\"hello\""),
        ),
        Frame::Event(event) => {
            let data = serde_json::to_string(&event.data).unwrap_or_else(|err| {
                warn!(error = %err, "failed to serialize stream event");
                "null".to_string()
            });
            let sse = SseEvent::default().data(data);
            Some(match event.id {
                Some(id) if is_valid_event_id(&id) => sse.id(id),
                Some(id) => {
                    warn!(id = ?id, "dropping event id that would break SSE framing");
                    sse
                }
                None => sse,
            })
        }
        // The stream already started, so a late one-shot problem goes in-band.
        Frame::StreamError(problem) | Frame::Problem(problem) => {
            let data = serde_json::to_string(&problem).unwrap_or_else(|_| problem.to_string());
            Some(SseEvent::default().event("error").data(data))
        }
        Frame::Json(_) | Frame::Raw(_) => {
            warn!("one-shot frame emitted on an open stream");
            None
        }
    }
}

/// SSE ids are a single line and may not contain NUL.
fn is_valid_event_id(id: &str) -> bool {
    !id.contains(['\0', '\r', '\n'])
}
