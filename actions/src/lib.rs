//! Per-request action execution engine.
//!
//! An action is a resource handler that declares which representations it
//! can produce. For each request the engine:
//!
//! - **negotiates** a [`Representation`] from the `Accept` header ([`negotiate`]),
//! - **dispatches** to the action's matching capability ([`Engine::execute`]),
//! - for one-shot representations, renders the body or the first problem the
//!   action's step pipeline recorded ([`RequestContext::run`]),
//! - for event streams, runs a push loop that re-evaluates the action each
//!   time its [`Topic`] is published on the shared [`Broker`], until the
//!   stream completes, fails, or the client goes away.
//!
//! [`respond`] ties this to axum: it runs the engine on a task and turns the
//! emitted [`Frame`]s into a `Response`.

pub mod action;
pub mod broker;
pub mod context;
pub mod engine;
pub mod negotiate;
pub mod problem;
pub mod response;
pub mod steps;
pub mod stream;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{Action, EventStream, Raw, Structured};
pub use broker::{Broker, Subscription, SubscriptionGuard, Topic, TopicBroker, wake_channel};
pub use context::{Body, RequestContext};
pub use engine::{Engine, Outcome};
pub use negotiate::{Representation, negotiate};
pub use problem::{Problem, ProblemKind};
pub use response::{Frame, Responder, respond};
pub use steps::{Step, StepResult};
pub use stream::{Event, StreamConfig, StreamOutcome, StreamSession};
