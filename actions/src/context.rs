//! Per-request state shared by an action's steps.

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::negotiate::Representation;
use crate::problem::Problem;

/// Success payload written by a one-shot action.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Raw(Bytes),
}

/// State owned by the task handling a single request.
///
/// Holds the negotiated representation, the error slot that steps write to,
/// the request's cancellation signal, and the one-shot success body.
#[derive(Debug)]
pub struct RequestContext {
    representation: Representation,
    error: Option<Problem>,
    cancel: CancellationToken,
    pub(crate) setup_done: bool,
    body: Option<Body>,
}

impl RequestContext {
    pub fn new(representation: Representation, cancel: CancellationToken) -> Self {
        Self {
            representation,
            error: None,
            cancel,
            setup_done: false,
            body: None,
        }
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// The first problem recorded for this request, if any.
    pub fn error(&self) -> Option<&Problem> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Record a problem. The first recorded problem wins; the slot is never cleared.
    pub fn fail(&mut self, problem: Problem) {
        if self.error.is_none() {
            self.error = Some(problem);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle to the request's cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Serialize `value` as the one-shot success body.
    pub fn render_json<T: Serialize>(&mut self, value: &T) -> Result<(), Problem> {
        let json = serde_json::to_value(value)
            .map_err(|err| Problem::server_error(format!("serialize response: {err}")))?;
        self.body = Some(Body::Json(json));
        Ok(())
    }

    /// Use `bytes` as the one-shot success body.
    pub fn render_raw(&mut self, bytes: impl Into<Bytes>) -> Result<(), Problem> {
        self.body = Some(Body::Raw(bytes.into()));
        Ok(())
    }

    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }
}
