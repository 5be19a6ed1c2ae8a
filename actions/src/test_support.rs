//! Test-only doubles: a counting broker and scripted actions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::action::{Action, EventStream, Raw, Structured};
use crate::broker::{Broker, Subscription, Topic, TopicBroker};
use crate::context::RequestContext;
use crate::problem::Problem;
use crate::response::Frame;
use crate::stream::{Event, StreamSession};

/// Broker that delegates to a [`TopicBroker`] and counts calls.
#[derive(Debug, Default)]
pub struct CountingBroker {
    inner: TopicBroker,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    publishes: AtomicUsize,
}

impl CountingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscriptions created and not yet released.
    pub fn open(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst) - self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner.subscriber_count(topic)
    }
}

impl Broker for CountingBroker {
    fn subscribe(&self, topic: &Topic) -> Subscription {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribe(topic)
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.inner.unsubscribe(subscription);
    }

    fn publish(&self, topic: &Topic) {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(topic);
    }
}

/// Events with ids `from..to` and `{"n": id}` payloads.
pub fn events(from: u32, to: u32) -> Vec<Event> {
    (from..to)
        .map(|n| Event::with_id(n.to_string(), serde_json::json!({ "n": n })))
        .collect()
}

/// Receive frames until the engine drops its responder.
pub async fn collect_frames(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    frames
}

/// Hook invoked after a scripted production pass with the 1-based cycle number.
pub type CycleHook = Box<dyn FnMut(usize, &mut RequestContext) + Send>;

/// One production pass of a [`ScriptedStream`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedCycle {
    pub items: Vec<Event>,
    pub error: Option<Problem>,
    pub panic: bool,
}

/// Event-stream action that replays a fixed script of production passes.
///
/// Once the script is exhausted, further passes produce nothing.
pub struct ScriptedStream {
    topic: Topic,
    limit: Option<usize>,
    setup_error: Option<Problem>,
    cycles: VecDeque<ScriptedCycle>,
    hook: Option<CycleHook>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStream {
    pub fn new(topic: impl Into<Topic>) -> Self {
        Self {
            topic: topic.into(),
            limit: None,
            setup_error: None,
            cycles: VecDeque::new(),
            hook: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn failing_setup(mut self, problem: Problem) -> Self {
        self.setup_error = Some(problem);
        self
    }

    pub fn cycle(mut self, items: Vec<Event>) -> Self {
        self.cycles.push_back(ScriptedCycle {
            items,
            ..ScriptedCycle::default()
        });
        self
    }

    pub fn failing_cycle(mut self, items: Vec<Event>, problem: Problem) -> Self {
        self.cycles.push_back(ScriptedCycle {
            items,
            error: Some(problem),
            panic: false,
        });
        self
    }

    pub fn panicking_cycle(mut self) -> Self {
        self.cycles.push_back(ScriptedCycle {
            panic: true,
            ..ScriptedCycle::default()
        });
        self
    }

    pub fn on_cycle(
        mut self,
        hook: impl FnMut(usize, &mut RequestContext) + Send + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Shared counter of production passes.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Action for ScriptedStream {
    fn as_event_stream(&mut self) -> Option<&mut dyn EventStream> {
        Some(self)
    }
}

impl EventStream for ScriptedStream {
    fn topic(&self) -> Topic {
        self.topic.clone()
    }

    fn setup(&mut self, ctx: &mut RequestContext) {
        let error = self.setup_error.take();
        let mut check =
            move |_: &mut Self, _: &mut RequestContext| error.clone().map_or(Ok(()), Err);
        ctx.setup(self, &mut [&mut check]);
    }

    fn stream(&mut self, ctx: &mut RequestContext, session: &mut StreamSession) {
        let cycle = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.limit {
            session.set_limit(limit);
        }

        let script = self.cycles.pop_front().unwrap_or_default();
        if script.panic {
            panic!("scripted panic in cycle {cycle}");
        }
        for item in script.items {
            session.send(item);
        }
        if let Some(problem) = script.error {
            ctx.fail(problem);
        }

        if let Some(hook) = self.hook.as_mut() {
            hook(cycle, ctx);
        }
    }
}

/// Outcome a [`ScriptedOneShot`] produces when invoked.
#[derive(Debug, Clone)]
pub enum OneShotScript {
    Json(serde_json::Value),
    Raw(Bytes),
    Fail(Problem),
    /// Neither an error nor a body.
    Nothing,
}

/// Structured and/or raw action with a fixed result.
pub struct ScriptedOneShot {
    structured: Option<OneShotScript>,
    raw: Option<OneShotScript>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedOneShot {
    pub fn structured(script: OneShotScript) -> Self {
        Self {
            structured: Some(script),
            raw: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn raw(script: OneShotScript) -> Self {
        Self {
            structured: None,
            raw: Some(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn play(&self, script: Option<OneShotScript>, ctx: &mut RequestContext) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match script {
            Some(OneShotScript::Json(json)) => ctx.render_json(&json),
            Some(OneShotScript::Raw(bytes)) => ctx.render_raw(bytes),
            Some(OneShotScript::Fail(problem)) => Err(problem),
            Some(OneShotScript::Nothing) | None => Ok(()),
        };
        if let Err(problem) = result {
            ctx.fail(problem);
        }
    }
}

impl Action for ScriptedOneShot {
    fn as_structured(&mut self) -> Option<&mut dyn Structured> {
        if self.structured.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_raw(&mut self) -> Option<&mut dyn Raw> {
        if self.raw.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Structured for ScriptedOneShot {
    fn structured(&mut self, ctx: &mut RequestContext) {
        self.play(self.structured.clone(), ctx);
    }
}

impl Raw for ScriptedOneShot {
    fn raw(&mut self, ctx: &mut RequestContext) {
        self.play(self.raw.clone(), ctx);
    }
}
