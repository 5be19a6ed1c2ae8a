//! Capabilities an action can implement.
//!
//! An action opts into each representation it supports by implementing the
//! matching capability trait and returning itself from the corresponding
//! accessor on [`Action`]:
//!
//! ```ignore
//! impl Action for LedgerIndexAction {
//!     fn as_structured(&mut self) -> Option<&mut dyn Structured> {
//!         Some(self)
//!     }
//!     fn as_event_stream(&mut self) -> Option<&mut dyn EventStream> {
//!         Some(self)
//!     }
//! }
//! ```

use crate::broker::Topic;
use crate::context::RequestContext;
use crate::stream::StreamSession;

/// Capability query used by the engine to dispatch on the negotiated
/// representation. Every accessor defaults to "not supported".
pub trait Action: Send {
    fn as_structured(&mut self) -> Option<&mut dyn Structured> {
        None
    }

    fn as_event_stream(&mut self) -> Option<&mut dyn EventStream> {
        None
    }

    fn as_raw(&mut self) -> Option<&mut dyn Raw> {
        None
    }
}

/// Produces a JSON document.
pub trait Structured: Send {
    /// Set the context's error slot or render a body with
    /// [`RequestContext::render_json`].
    fn structured(&mut self, ctx: &mut RequestContext);
}

/// Produces raw bytes.
pub trait Raw: Send {
    /// Set the context's error slot or render a body with
    /// [`RequestContext::render_raw`].
    fn raw(&mut self, ctx: &mut RequestContext);
}

/// Produces an event stream, re-evaluated each time the stream wakes up.
pub trait EventStream: Send {
    /// Topic whose publications wake this stream. Defaults to
    /// [`Topic::none`], which re-evaluates on a timer instead.
    fn topic(&self) -> Topic {
        Topic::none()
    }

    /// Runs once before the first production pass.
    fn setup(&mut self, _ctx: &mut RequestContext) {}

    /// Queue any newly available items on `session`, or set the error slot.
    fn stream(&mut self, ctx: &mut RequestContext, session: &mut StreamSession);
}
