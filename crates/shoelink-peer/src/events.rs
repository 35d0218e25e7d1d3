//! Per-kind publish/subscribe for channel events.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::Serialize;
use shoelink_frame::{ChannelName, Message};
use shoelink_transport::ErrorKind;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::PeerError;

/// Error type subscribers may return. It is logged, never propagated.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(&Event) -> Result<(), BoxError> + Send + Sync>;

/// The four event kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    Disconnected,
    Data,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Data,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Data => "data",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Connected,
    Disconnected,
    Data { message: Message },
    Error { kind: ErrorKind, message: String },
}

/// An event and the channel it happened on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub channel: ChannelName,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn connected(channel: ChannelName) -> Self {
        Self {
            channel,
            payload: EventPayload::Connected,
        }
    }

    pub fn disconnected(channel: ChannelName) -> Self {
        Self {
            channel,
            payload: EventPayload::Disconnected,
        }
    }

    pub fn data(message: Message) -> Self {
        Self {
            channel: message.channel().clone(),
            payload: EventPayload::Data { message },
        }
    }

    pub fn error(channel: ChannelName, err: &PeerError) -> Self {
        Self {
            channel,
            payload: EventPayload::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Connected => EventKind::Connected,
            EventPayload::Disconnected => EventKind::Disconnected,
            EventPayload::Data { .. } => EventKind::Data,
            EventPayload::Error { .. } => EventKind::Error,
        }
    }

    /// The decoded message, for `data` events.
    pub fn message(&self) -> Option<&Message> {
        match &self.payload {
            EventPayload::Data { message } => Some(message),
            _ => None,
        }
    }
}

/// Handle returned by `subscribe`; pass it to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    channel: Option<ChannelName>,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<EventKind, Vec<Subscriber>>>,
}

/// Event fan-out shared by every channel of a coordinator.
///
/// Subscribers of a kind run in registration order. A subscriber that
/// returns an error or panics is logged and skipped; the rest still run.
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<BusState>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(EventKind, usize)> = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, self.subscriber_count(kind)))
            .collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Subscriber>>> {
        self.state
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(
        &self,
        kind: EventKind,
        channel: Option<ChannelName>,
        callback: Callback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.state.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().entry(kind).or_default().push(Subscriber {
            id,
            channel,
            callback,
        });
        id
    }

    /// Register `callback` for every event of `kind`, on any channel.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(kind, None, Arc::new(callback))
    }

    /// Register `callback` for events of `kind` on one channel only.
    pub fn subscribe_channel<F>(
        &self,
        channel: ChannelName,
        kind: EventKind,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(kind, Some(channel), Arc::new(callback))
    }

    /// Remove a subscription. Unknown ids are a no-op and return false.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        for list in subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to its subscribers and return how many accepted it.
    ///
    /// Runs on the caller's task. Callbacks may subscribe or unsubscribe;
    /// the change applies from the next emit.
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Subscriber> = self
            .subscribers()
            .get(&kind)
            .map(|list| {
                list.iter()
                    .filter(|s| s.channel.as_ref().map_or(true, |c| *c == event.channel))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for subscriber in snapshot {
            match catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(
                    channel = %event.channel,
                    event = %kind,
                    error = %err,
                    "event subscriber failed"
                ),
                Err(_) => warn!(
                    channel = %event.channel,
                    event = %kind,
                    "event subscriber panicked"
                ),
            }
        }
        delivered
    }

    /// Decoded messages as a stream, from one channel or all of them.
    ///
    /// The stream is unbounded and never ends on its own; dropping it
    /// removes the underlying subscription.
    pub fn messages(&self, channel: Option<ChannelName>) -> MessageStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: Callback = Arc::new(move |event: &Event| {
            if let Some(message) = event.message() {
                // Receiver gone means the stream is being dropped.
                let _ = tx.send(message.clone());
            }
            Ok(())
        });
        let subscription = self.register(EventKind::Data, channel, callback);
        MessageStream {
            rx,
            bus: self.clone(),
            subscription,
        }
    }
}

/// Lazy sequence of decoded messages fed by an [`EventBus`].
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<Message>,
    bus: EventBus,
    subscription: SubscriptionId,
}

impl MessageStream {
    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take a message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}
