use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use shoelink_frame::{encode_command, ChannelName, LineFramer, Message};
use shoelink_transport::{ErrorKind, Incoming, Link, LinkEvent, Transport, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, Mode};
use crate::config::ChannelConfig;
use crate::error::{PeerError, Result};
use crate::events::{Event, EventBus, MessageStream};
use crate::queue::OperationQueue;

/// Future returned by channel operations.
///
/// The operation is already queued when the future is handed out.
pub type OpFuture = BoxFuture<'static, Result<()>>;

/// Connection lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last failure recorded on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PeerError> for ErrorInfo {
    fn from(err: &PeerError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Snapshot of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelName,
    pub transport: String,
    pub state: ChannelState,
    pub linked: bool,
    pub last_error: Option<ErrorInfo>,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected && self.linked
    }
}

struct Inner {
    state: ChannelState,
    link: Option<Arc<dyn Link>>,
    last_error: Option<ErrorInfo>,
    // Bumped whenever the current link is replaced or torn down; reader
    // tasks carrying an older value are ignored.
    generation: u64,
    reader: Option<CancellationToken>,
    framer: LineFramer,
}

impl Inner {
    fn live_link(&self) -> Option<Arc<dyn Link>> {
        if self.state != ChannelState::Connected {
            return None;
        }
        self.link.as_ref().filter(|link| link.is_linked()).cloned()
    }
}

struct Shared {
    name: ChannelName,
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    bus: EventBus,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `err` as the channel's last error, broadcast it and hand it back.
    fn report(&self, err: PeerError) -> PeerError {
        self.lock().last_error = Some(ErrorInfo::from(&err));
        warn!(channel = %self.name, kind = %err.kind(), error = %err, "channel operation failed");
        self.bus.emit(&Event::error(self.name.clone(), &err));
        err
    }

    fn fail_connect(&self, err: PeerError) -> PeerError {
        {
            let mut inner = self.lock();
            inner.state = ChannelState::Disconnected;
            inner.link = None;
        }
        self.report(err)
    }

    fn on_chunk(&self, generation: u64, chunk: &[u8]) {
        let mut messages: Vec<Message> = Vec::new();
        let result = {
            let mut inner = self.lock();
            if inner.generation != generation {
                trace!(channel = %self.name, "dropping chunk from stale link");
                return;
            }
            inner.framer.feed_with(chunk, |message| messages.push(message))
        };

        for message in messages {
            trace!(channel = %self.name, text = message.text(), "message");
            self.bus.emit(&Event::data(message));
        }
        if let Err(err) = result {
            self.report(err.into());
        }
    }

    fn on_link_dropped(&self, generation: u64, reason: Option<String>) {
        let link = {
            let mut inner = self.lock();
            if inner.generation != generation || inner.state != ChannelState::Connected {
                debug!(channel = %self.name, "ignoring drop of inactive link");
                return;
            }
            inner.generation += 1;
            inner.state = ChannelState::Disconnected;
            inner.reader = None;
            inner.framer.reset();
            inner.link.take()
        };
        drop(link);
        info!(
            channel = %self.name,
            reason = reason.as_deref().unwrap_or("unknown"),
            "link dropped"
        );
        self.bus.emit(&Event::disconnected(self.name.clone()));
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut incoming: Incoming,
    generation: u64,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => return,
            event = incoming.recv() => event,
        };
        match event {
            Some(LinkEvent::Chunk(bytes)) => shared.on_chunk(generation, &bytes),
            Some(LinkEvent::Dropped { reason }) => {
                shared.on_link_dropped(generation, reason);
                return;
            }
            None => {
                shared.on_link_dropped(generation, Some("incoming stream closed".to_string()));
                return;
            }
        }
    }
}

/// Best-effort close; a failure is logged and otherwise ignored.
async fn close_link(channel: &ChannelName, link: &dyn Link) {
    if let Err(err) = link.close().await {
        warn!(channel = %channel, error = %err, "link teardown failed; marking disconnected");
    }
}

async fn do_connect(shared: Arc<Shared>) -> Result<()> {
    let (stale, previous) = {
        let mut inner = shared.lock();
        if inner.live_link().is_some() {
            debug!(channel = %shared.name, "already connected");
            return Ok(());
        }
        // Connected with a dead link: the drop notification is still in
        // flight. Its reader is retired here, so report the drop ourselves.
        let stale = inner.state == ChannelState::Connected;
        if let Some(token) = inner.reader.take() {
            token.cancel();
        }
        inner.generation += 1;
        let previous = inner.link.take();
        inner.framer.reset();
        inner.state = ChannelState::Connecting;
        (stale, previous)
    };
    if let Some(link) = previous {
        close_link(&shared.name, &*link).await;
    }
    if stale {
        info!(channel = %shared.name, "link dropped");
        shared.bus.emit(&Event::disconnected(shared.name.clone()));
    }
    info!(channel = %shared.name, transport = %shared.transport.describe(), "connecting");

    let mut link = match shared.transport.open(shared.config.filter.as_ref()).await {
        Ok(link) => link,
        Err(err) => return Err(shared.fail_connect(err.into())),
    };
    let incoming = link.subscribe();
    let link: Arc<dyn Link> = Arc::from(link);

    let settle = shared.config.connect_settle();
    if !settle.is_zero() {
        debug!(channel = %shared.name, ?settle, "waiting for device to settle");
        tokio::time::sleep(settle).await;
    }

    let Some(incoming) = incoming else {
        close_link(&shared.name, &*link).await;
        return Err(shared.fail_connect(PeerError::Internal(
            "link has no incoming stream".to_string(),
        )));
    };
    if !link.is_linked() {
        close_link(&shared.name, &*link).await;
        return Err(shared.fail_connect(
            TransportError::Link("link dropped while connecting".to_string()).into(),
        ));
    }

    let token = CancellationToken::new();
    let generation = {
        let mut inner = shared.lock();
        inner.generation += 1;
        inner.link = Some(link);
        inner.state = ChannelState::Connected;
        inner.last_error = None;
        inner.reader = Some(token.clone());
        inner.generation
    };
    tokio::spawn(read_loop(Arc::clone(&shared), incoming, generation, token));

    info!(channel = %shared.name, "connected");
    shared.bus.emit(&Event::connected(shared.name.clone()));
    Ok(())
}

async fn do_send(shared: Arc<Shared>, payload: Bytes) -> Result<()> {
    let link = shared.lock().live_link();
    let Some(link) = link else {
        return Err(shared.report(PeerError::NotConnected(shared.name.clone())));
    };

    debug!(channel = %shared.name, len = payload.len(), "writing");
    if let Err(err) = link.write(&payload).await {
        return Err(shared.report(err.into()));
    }

    let settle = shared.config.write_settle();
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    Ok(())
}

async fn do_disconnect(shared: Arc<Shared>) -> Result<()> {
    let (link, reader) = {
        let mut inner = shared.lock();
        if inner.state == ChannelState::Disconnected && inner.link.is_none() {
            debug!(channel = %shared.name, "already disconnected");
            return Ok(());
        }
        inner.generation += 1;
        inner.state = ChannelState::Disconnecting;
        (inner.link.take(), inner.reader.take())
    };
    info!(channel = %shared.name, "disconnecting");

    if let Some(token) = reader {
        token.cancel();
    }
    if let Some(link) = link {
        close_link(&shared.name, &*link).await;
    }

    {
        let mut inner = shared.lock();
        inner.framer.reset();
        inner.state = ChannelState::Disconnected;
    }
    info!(channel = %shared.name, "disconnected");
    shared.bus.emit(&Event::disconnected(shared.name.clone()));
    Ok(())
}

/// One device channel: its link, lifecycle, framing and operation queue.
///
/// Every operation (`connect`, `disconnect`, `send` and the command helpers)
/// is queued the moment it is called and runs strictly after the ones
/// submitted before it. The returned future only reports the outcome.
/// Failures are also broadcast as `error` events on the bus.
pub struct ChannelManager {
    shared: Arc<Shared>,
    queue: OperationQueue,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("name", &self.shared.name)
            .field("transport", &self.shared.transport.describe())
            .field("state", &self.state())
            .finish()
    }
}

impl ChannelManager {
    /// Must be called inside a Tokio runtime.
    pub fn new(
        name: ChannelName,
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
        bus: EventBus,
    ) -> Self {
        let framer = LineFramer::with_config(name.clone(), &config.frame);
        let queue = OperationQueue::new(name.clone());
        Self {
            shared: Arc::new(Shared {
                name,
                transport,
                config,
                bus,
                inner: Mutex::new(Inner {
                    state: ChannelState::Disconnected,
                    link: None,
                    last_error: None,
                    generation: 0,
                    reader: None,
                    framer,
                }),
            }),
            queue,
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.shared.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().state
    }

    /// Connected with a link the transport still reports as up.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().live_link().is_some()
    }

    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.shared.lock().last_error.clone()
    }

    pub fn status(&self) -> ChannelStatus {
        let inner = self.shared.lock();
        ChannelStatus {
            channel: self.shared.name.clone(),
            transport: self.shared.transport.describe(),
            state: inner.state,
            linked: inner.link.as_ref().is_some_and(|link| link.is_linked()),
            last_error: inner.last_error.clone(),
        }
    }

    /// Whether an operation is running right now.
    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    /// Operations waiting behind the running one.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Decoded messages from this channel.
    pub fn messages(&self) -> MessageStream {
        self.shared.bus.messages(Some(self.shared.name.clone()))
    }

    /// Open a link. A no-op when already connected.
    pub fn connect(&self) -> OpFuture {
        self.queue.enqueue(do_connect(Arc::clone(&self.shared))).boxed()
    }

    /// Close the link. A no-op, without event, when already disconnected.
    ///
    /// Transport teardown errors are logged and swallowed; the channel ends
    /// up disconnected regardless.
    pub fn disconnect(&self) -> OpFuture {
        self.queue
            .enqueue(do_disconnect(Arc::clone(&self.shared)))
            .boxed()
    }

    /// Write a text command, trimmed and terminated per the channel config.
    pub fn send(&self, command: &str) -> OpFuture {
        let payload = encode_command(command, self.shared.config.append_newline);
        self.send_bytes(payload)
    }

    /// Write raw bytes as-is.
    pub fn send_bytes(&self, payload: Bytes) -> OpFuture {
        self.queue
            .enqueue(do_send(Arc::clone(&self.shared), payload))
            .boxed()
    }

    pub fn send_command(&self, command: &Command) -> OpFuture {
        self.send(&command.to_wire())
    }

    /// Switch firmware mode.
    ///
    /// Fails immediately with `NotConnected` instead of queueing when the
    /// channel is not connected at call time, even if a `connect` is still
    /// queued ahead of it.
    pub fn set_mode(&self, mode: Mode) -> OpFuture {
        if !self.is_connected() {
            let err = self
                .shared
                .report(PeerError::NotConnected(self.shared.name.clone()));
            return future::ready(Err(err)).boxed();
        }
        self.send_command(&Command::set_mode(mode))
    }

    pub fn set_keymap(&self, index: u32, key_code: u32) -> OpFuture {
        self.send_command(&Command::set_keymap(index, key_code))
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(token) = self.shared.lock().reader.take() {
            token.cancel();
        }
    }
}
