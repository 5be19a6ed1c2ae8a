//! Event-stream execution: the per-connection session and the push loop.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::action::EventStream;
use crate::broker::{Broker, SubscriptionGuard};
use crate::context::RequestContext;
use crate::response::{Frame, Responder};

/// A single item pushed to a streaming client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Resume token for the client (rendered as the SSE `id`).
    pub id: Option<String>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(data: serde_json::Value) -> Self {
        Self { id: None, data }
    }

    pub fn with_id(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Some(id.into()),
            data,
        }
    }
}

/// Progress of one streaming connection.
#[derive(Debug, Default)]
pub struct StreamSession {
    sent: usize,
    limit: Option<usize>,
    done: bool,
    pending: Vec<Event>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event. Ignored once the session is done.
    pub fn send(&mut self, event: Event) {
        if self.done {
            return;
        }
        self.pending.push(event);
        self.sent += 1;
        self.check_limit();
    }

    /// Events sent (or queued to be sent) on this connection.
    pub fn sent_count(&self) -> usize {
        self.sent
    }

    /// Finish the stream after `limit` events.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
        self.check_limit();
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Mark the stream as complete.
    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn check_limit(&mut self) {
        if self.limit.is_some_and(|limit| self.sent >= limit) {
            self.done = true;
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }
}

/// Timing knobs for streaming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Reconnect delay advertised to clients in each preamble.
    pub retry: Duration,
    /// Re-evaluation interval for streams without a topic.
    pub idle_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry: Duration::from_secs(1),
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// How a streaming request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The action marked the session done.
    Completed,
    /// The request was cancelled while waiting for a wake-up.
    Cancelled,
    /// An error was rendered as a one-shot response before any item was sent.
    Failed,
    /// An error was delivered in-band after at least one item.
    FailedInBand,
    /// The response sink went away.
    Disconnected,
    /// The subscription's wake-up channel closed.
    BrokerClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Setup,
    Producing,
    AwaitingWakeup,
    Done(StreamOutcome),
}

/// Drive `action` until the stream completes, fails, or is cancelled.
///
/// The topic subscription is held by a guard, so it is released on every
/// exit path.
#[instrument(skip_all, fields(topic = %action.topic()))]
pub(crate) async fn drive(
    action: &mut dyn EventStream,
    ctx: &mut RequestContext,
    broker: Arc<dyn Broker>,
    config: &StreamConfig,
    out: &Responder,
) -> StreamOutcome {
    let mut subscription = SubscriptionGuard::subscribe(broker, &action.topic());
    let mut session = StreamSession::new();
    let mut phase = StreamPhase::Setup;
    let mut cycles = 0u64;

    loop {
        phase = match phase {
            StreamPhase::Setup => {
                action.setup(ctx);
                match ctx.error().cloned() {
                    Some(problem) => {
                        debug!(kind = ?problem.kind, "stream setup failed");
                        // Best effort: nothing is left to do if the client is gone.
                        let _ = out.send(Frame::Problem(problem)).await;
                        StreamPhase::Done(StreamOutcome::Failed)
                    }
                    None => StreamPhase::Producing,
                }
            }
            StreamPhase::Producing => {
                cycles += 1;
                action.stream(ctx, &mut session);
                produced(ctx, &mut session, config, out).await
            }
            StreamPhase::AwaitingWakeup => {
                tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => StreamPhase::Done(StreamOutcome::Cancelled),
                    woke = wait_for_wakeup(&mut subscription, config.idle_interval) => {
                        if woke {
                            StreamPhase::Producing
                        } else {
                            StreamPhase::Done(StreamOutcome::BrokerClosed)
                        }
                    }
                }
            }
            StreamPhase::Done(outcome) => {
                info!(?outcome, sent = session.sent_count(), cycles, "stream finished");
                return outcome;
            }
        };
    }
}

/// Flush what a production pass queued and decide the next phase.
async fn produced(
    ctx: &RequestContext,
    session: &mut StreamSession,
    config: &StreamConfig,
    out: &Responder,
) -> StreamPhase {
    for event in session.drain() {
        if out.send(Frame::Event(event)).await.is_err() {
            return StreamPhase::Done(StreamOutcome::Disconnected);
        }
    }

    if let Some(problem) = ctx.error().cloned() {
        // Before the first item the client still gets a plain error response.
        let (frame, outcome) = if session.sent_count() == 0 {
            (Frame::Problem(problem), StreamOutcome::Failed)
        } else {
            (Frame::StreamError(problem), StreamOutcome::FailedInBand)
        };
        let _ = out.send(frame).await;
        return StreamPhase::Done(outcome);
    }

    if session.is_done() {
        return StreamPhase::Done(StreamOutcome::Completed);
    }

    if out
        .send(Frame::Preamble {
            retry: config.retry,
        })
        .await
        .is_err()
    {
        return StreamPhase::Done(StreamOutcome::Disconnected);
    }
    StreamPhase::AwaitingWakeup
}

async fn wait_for_wakeup(subscription: &mut SubscriptionGuard, idle: Duration) -> bool {
    if subscription.topic().is_none() {
        tokio::time::sleep(idle).await;
        return true;
    }
    subscription.wake_mut().woken().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> Event {
        Event::with_id(n.to_string(), serde_json::json!({ "n": n }))
    }

    #[test]
    fn send_counts_and_queues_events() {
        let mut session = StreamSession::new();
        session.send(event(1));
        session.send(event(2));
        assert_eq!(session.sent_count(), 2);
        assert_eq!(session.drain(), vec![event(1), event(2)]);
        assert!(session.drain().is_empty());
        assert_eq!(session.sent_count(), 2);
    }

    #[test]
    fn reaching_limit_marks_done_and_drops_extra_events() {
        let mut session = StreamSession::new();
        session.set_limit(2);
        session.send(event(1));
        assert!(!session.is_done());
        session.send(event(2));
        assert!(session.is_done());
        session.send(event(3));
        assert_eq!(session.sent_count(), 2);
    }

    #[test]
    fn lowering_limit_below_sent_count_finishes() {
        let mut session = StreamSession::new();
        session.send(event(1));
        session.send(event(2));
        session.set_limit(1);
        assert!(session.is_done());
    }

    #[test]
    fn finish_marks_done() {
        let mut session = StreamSession::new();
        session.finish();
        assert!(session.is_done());
        assert_eq!(session.limit(), None);
    }
}
