//! Topic registry used to wake suspended streams when state changes.
//!
//! Streams subscribe to the [`Topic`] describing the data they render.
//! Whatever observes state changes (for example, ledger ingestion) calls
//! [`Broker::publish`], which pokes each subscriber's single-slot wake-up
//! channel. Wake-ups coalesce: a subscriber only learns that something
//! changed since it last looked.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Key identifying a class of state change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// No specific topic. Streams without a topic run on a timer.
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Subscribers of this topic are woken by every publish.
    pub fn any() -> Self {
        Self("*".to_string())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Create a single-slot wake-up channel.
pub fn wake_channel() -> (WakeSender, WakeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (WakeSender(tx), WakeReceiver(rx))
}

/// Sending half of a wake-up channel.
#[derive(Debug, Clone)]
pub struct WakeSender(mpsc::Sender<()>);

impl WakeSender {
    /// Signal the receiver without blocking.
    ///
    /// Returns `false` when a wake-up was already pending (coalesced) or the
    /// receiver is gone.
    pub fn wake(&self) -> bool {
        match self.0.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Receiving half of a wake-up channel.
#[derive(Debug)]
pub struct WakeReceiver(mpsc::Receiver<()>);

impl WakeReceiver {
    /// Wait for the next wake-up. Returns `false` once every sender is gone.
    pub async fn woken(&mut self) -> bool {
        self.0.recv().await.is_some()
    }

    /// Consume a pending wake-up without waiting.
    pub fn try_woken(&mut self) -> bool {
        self.0.try_recv().is_ok()
    }
}

/// A wake-up channel registered (or not) under a topic.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: Topic,
    wake: WakeReceiver,
}

impl Subscription {
    pub fn new(id: u64, topic: Topic, wake: WakeReceiver) -> Self {
        Self { id, topic, wake }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn wake_mut(&mut self) -> &mut WakeReceiver {
        &mut self.wake
    }
}

/// Registry of topic subscriptions shared by every request task.
pub trait Broker: Send + Sync {
    /// Register a new wake-up channel under `topic`.
    ///
    /// For [`Topic::none`] the returned subscription is not registered anywhere.
    fn subscribe(&self, topic: &Topic) -> Subscription;

    /// Remove a subscription. Safe to call for unregistered or already removed
    /// subscriptions.
    fn unsubscribe(&self, subscription: &Subscription);

    /// Wake every subscriber of `topic` and of [`Topic::any`].
    fn publish(&self, topic: &Topic);
}

/// Mutex-guarded in-process [`Broker`].
#[derive(Debug, Default)]
pub struct TopicBroker {
    next_id: AtomicU64,
    topics: Mutex<HashMap<Topic, HashMap<u64, WakeSender>>>,
}

impl TopicBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions under `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.lock().get(topic).map_or(0, HashMap::len)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}

impl Broker for TopicBroker {
    fn subscribe(&self, topic: &Topic) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = wake_channel();
        if !topic.is_none() {
            self.topics
                .lock()
                .entry(topic.clone())
                .or_default()
                .insert(id, tx);
            debug!(topic = %topic, id, "subscribed");
        }
        Subscription::new(id, topic.clone(), rx)
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let topic = subscription.topic();
        if topic.is_none() {
            return;
        }
        let mut topics = self.topics.lock();
        if let Some(subscribers) = topics.get_mut(topic) {
            if subscribers.remove(&subscription.id()).is_some() {
                debug!(topic = %topic, id = subscription.id(), "unsubscribed");
            }
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn publish(&self, topic: &Topic) {
        if topic.is_none() {
            return;
        }
        let any = Topic::any();
        let senders: Vec<WakeSender> = {
            let topics = self.topics.lock();
            let mut senders: Vec<WakeSender> = topics
                .get(topic)
                .map(|subscribers| subscribers.values().cloned().collect())
                .unwrap_or_default();
            if *topic != any
                && let Some(subscribers) = topics.get(&any)
            {
                senders.extend(subscribers.values().cloned());
            }
            senders
        };

        let woken = senders.iter().filter(|sender| sender.wake()).count();
        trace!(topic = %topic, subscribers = senders.len(), woken, "published");
    }
}

/// Owns a subscription and releases it when dropped.
///
/// Holding the subscription through this guard releases it on every exit
/// path of the owner, including unwinding and task abort.
pub struct SubscriptionGuard {
    broker: Arc<dyn Broker>,
    subscription: Subscription,
}

impl SubscriptionGuard {
    pub fn subscribe(broker: Arc<dyn Broker>, topic: &Topic) -> Self {
        let subscription = broker.subscribe(topic);
        Self {
            broker,
            subscription,
        }
    }

    pub fn topic(&self) -> &Topic {
        self.subscription.topic()
    }

    pub fn wake_mut(&mut self) -> &mut WakeReceiver {
        self.subscription.wake_mut()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.subscription);
    }
}
