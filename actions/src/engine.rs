//! Action dispatch: one call per request.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::action::Action;
use crate::broker::Broker;
use crate::context::{Body, RequestContext};
use crate::negotiate::Representation;
use crate::problem::Problem;
use crate::response::{Frame, Responder};
use crate::stream::{StreamConfig, StreamOutcome, drive};

/// Result of executing an action for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A one-shot success body was rendered.
    Rendered,
    /// A one-shot problem was rendered from the error slot.
    Failed,
    /// The action does not support the negotiated representation.
    NotAcceptable,
    /// The response sink went away before the one-shot frame was sent.
    Disconnected,
    /// The request was served as an event stream.
    Streamed(StreamOutcome),
}

/// Executes actions against a shared topic broker.
pub struct Engine {
    broker: Arc<dyn Broker>,
    config: StreamConfig,
}

impl Engine {
    pub fn new(broker: Arc<dyn Broker>, config: StreamConfig) -> Self {
        Self { broker, config }
    }

    /// Dispatch `action` on the representation negotiated for `ctx`.
    ///
    /// If the action lacks the matching capability, a not-acceptable problem
    /// is emitted and no action code runs.
    #[instrument(skip_all, fields(representation = ?ctx.representation()))]
    pub async fn execute(
        &self,
        action: &mut dyn Action,
        ctx: &mut RequestContext,
        out: &Responder,
    ) -> Outcome {
        match ctx.representation() {
            Representation::Structured => match action.as_structured() {
                Some(structured) => {
                    structured.structured(ctx);
                    finish_one_shot(ctx, out).await
                }
                None => not_acceptable(out).await,
            },
            Representation::Raw => match action.as_raw() {
                Some(raw) => {
                    raw.raw(ctx);
                    finish_one_shot(ctx, out).await
                }
                None => not_acceptable(out).await,
            },
            Representation::EventStream => match action.as_event_stream() {
                Some(stream) => {
                    let outcome = drive(stream, ctx, self.broker.clone(), &self.config, out).await;
                    Outcome::Streamed(outcome)
                }
                None => not_acceptable(out).await,
            },
            Representation::Unacceptable => not_acceptable(out).await,
        }
    }
}

async fn not_acceptable(out: &Responder) -> Outcome {
    debug!("no capability for negotiated representation");
    match out.send(Frame::Problem(Problem::not_acceptable())).await {
        Ok(()) => Outcome::NotAcceptable,
        Err(_) => Outcome::Disconnected,
    }
}

async fn finish_one_shot(ctx: &mut RequestContext, out: &Responder) -> Outcome {
    let (frame, outcome) = match (ctx.error().cloned(), ctx.take_body()) {
        (Some(problem), _) => (Frame::Problem(problem), Outcome::Failed),
        (None, Some(Body::Json(json))) => (Frame::Json(json), Outcome::Rendered),
        (None, Some(Body::Raw(bytes))) => (Frame::Raw(bytes), Outcome::Rendered),
        (None, None) => {
            warn!("action finished without an error or a body");
            (
                Frame::Problem(Problem::server_error("the action produced no response")),
                Outcome::Failed,
            )
        }
    };
    match out.send(frame).await {
        Ok(()) => outcome,
        Err(_) => Outcome::Disconnected,
    }
}
