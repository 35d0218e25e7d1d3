//! In-process device binding.
//!
//! [`MemoryTransport`] behaves like a single paired device that lives inside
//! the process. The matching [`MemoryDevice`] handle plays the device side:
//! it pushes notifications, drops the link unsolicited, scripts failures and
//! records everything the host did, in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{
    incoming_channel, DiscoveryFilter, Incoming, IncomingSender, Link, LinkEvent, Transport,
    NORDIC_UART_SERVICE,
};

/// A failure the device side can inject into the next open, write or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    NotAvailable,
    UserCancelled,
    Link,
}

impl ScriptedFailure {
    fn into_error(self) -> TransportError {
        match self {
            ScriptedFailure::NotAvailable => {
                TransportError::NotAvailable("scripted: no adapter".to_string())
            }
            ScriptedFailure::UserCancelled => TransportError::UserCancelled,
            ScriptedFailure::Link => TransportError::Link("scripted link failure".to_string()),
        }
    }
}

/// One host-side operation as observed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    OpenStarted,
    OpenFinished { ok: bool },
    WriteStarted(Bytes),
    WriteFinished { ok: bool },
    Closed,
}

#[derive(Debug)]
struct ActiveLink {
    id: u64,
    tx: IncomingSender,
    linked: Arc<AtomicBool>,
}

#[derive(Debug)]
struct DeviceState {
    name: String,
    services: Vec<String>,
    open_failures: VecDeque<ScriptedFailure>,
    write_failures: VecDeque<ScriptedFailure>,
    close_failures: VecDeque<ScriptedFailure>,
    open_delay: Duration,
    write_delay: Duration,
    active: Option<ActiveLink>,
    next_link_id: u64,
    opens: usize,
    written: Vec<Bytes>,
    journal: Vec<JournalEntry>,
}

type Shared = Arc<Mutex<DeviceState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, DeviceState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport whose single device lives in-process.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Shared,
}

impl MemoryTransport {
    /// A device advertising `name` and the Nordic UART service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(DeviceState {
                name: name.into(),
                services: vec![NORDIC_UART_SERVICE.to_string()],
                open_failures: VecDeque::new(),
                write_failures: VecDeque::new(),
                close_failures: VecDeque::new(),
                open_delay: Duration::ZERO,
                write_delay: Duration::ZERO,
                active: None,
                next_link_id: 1,
                opens: 0,
                written: Vec::new(),
                journal: Vec::new(),
            })),
        }
    }

    /// Control handle for the device side.
    pub fn device(&self) -> MemoryDevice {
        MemoryDevice {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn describe(&self) -> String {
        format!("memory:{}", lock(&self.shared).name)
    }

    async fn open(&self, filter: Option<&DiscoveryFilter>) -> Result<Box<dyn Link>> {
        let delay = {
            let mut state = lock(&self.shared);
            state.journal.push(JournalEntry::OpenStarted);
            state.open_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.shared);
        let outcome = match state.open_failures.pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => match filter {
                Some(filter) => {
                    let services: Vec<&str> = state.services.iter().map(String::as_str).collect();
                    if filter.matches(&state.name, &services) {
                        Ok(())
                    } else {
                        Err(TransportError::NotAvailable(format!(
                            "no device matching filter (saw {})",
                            state.name
                        )))
                    }
                }
                None => Ok(()),
            },
        };

        if let Err(err) = outcome {
            state.journal.push(JournalEntry::OpenFinished { ok: false });
            return Err(err);
        }

        if let Some(previous) = state.active.take() {
            previous.linked.store(false, Ordering::SeqCst);
        }

        let (tx, rx) = incoming_channel();
        let linked = Arc::new(AtomicBool::new(true));
        let id = state.next_link_id;
        state.next_link_id += 1;
        state.opens += 1;
        state.active = Some(ActiveLink {
            id,
            tx,
            linked: Arc::clone(&linked),
        });
        state.journal.push(JournalEntry::OpenFinished { ok: true });
        debug!(device = %state.name, link = id, "memory link opened");

        Ok(Box::new(MemoryLink {
            id,
            shared: Arc::clone(&self.shared),
            incoming: Some(rx),
            linked,
        }))
    }
}

struct MemoryLink {
    id: u64,
    shared: Shared,
    incoming: Option<Incoming>,
    linked: Arc<AtomicBool>,
}

#[async_trait]
impl Link for MemoryLink {
    fn subscribe(&mut self) -> Option<Incoming> {
        self.incoming.take()
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let payload = Bytes::copy_from_slice(bytes);
        let delay = {
            let mut state = lock(&self.shared);
            state.journal.push(JournalEntry::WriteStarted(payload.clone()));
            state.write_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.shared);
        let result = if !self.linked.load(Ordering::SeqCst) {
            Err(TransportError::NotConnected)
        } else if let Some(failure) = state.write_failures.pop_front() {
            Err(failure.into_error())
        } else {
            state.written.push(payload);
            Ok(())
        };
        state.journal.push(JournalEntry::WriteFinished {
            ok: result.is_ok(),
        });
        result
    }

    async fn close(&self) -> Result<()> {
        self.linked.store(false, Ordering::SeqCst);
        let mut state = lock(&self.shared);
        if state.active.as_ref().is_some_and(|active| active.id == self.id) {
            state.active = None;
        }
        state.journal.push(JournalEntry::Closed);
        // The link is down either way; a scripted failure only changes the report.
        match state.close_failures.pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }
}

/// Device-side control handle for a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    shared: Shared,
}

impl MemoryDevice {
    /// Send a notification chunk to the host. Returns false if no link is up.
    pub fn push(&self, bytes: impl AsRef<[u8]>) -> bool {
        let state = lock(&self.shared);
        match &state.active {
            Some(active) => active
                .tx
                .send(LinkEvent::Chunk(Bytes::copy_from_slice(bytes.as_ref())))
                .is_ok(),
            None => false,
        }
    }

    /// Drop the link from the device side. Returns false if no link was up.
    pub fn drop_link(&self, reason: &str) -> bool {
        let mut state = lock(&self.shared);
        match state.active.take() {
            Some(active) => {
                active.linked.store(false, Ordering::SeqCst);
                let _ = active.tx.send(LinkEvent::Dropped {
                    reason: Some(reason.to_string()),
                });
                true
            }
            None => false,
        }
    }

    /// Lose the link without notifying the host, as if the drop
    /// notification were still in flight. Returns false if no link was up.
    pub fn sever(&self) -> bool {
        let state = lock(&self.shared);
        match &state.active {
            Some(active) => active.linked.swap(false, Ordering::SeqCst),
            None => false,
        }
    }

    /// Make the next `open` fail.
    pub fn fail_next_open(&self, failure: ScriptedFailure) {
        lock(&self.shared).open_failures.push_back(failure);
    }

    /// Make the next `write` fail.
    pub fn fail_next_write(&self, failure: ScriptedFailure) {
        lock(&self.shared).write_failures.push_back(failure);
    }

    /// Make the next `close` report a failure. The link still goes down.
    pub fn fail_next_close(&self, failure: ScriptedFailure) {
        lock(&self.shared).close_failures.push_back(failure);
    }

    /// Latency applied to every `open`.
    pub fn set_open_delay(&self, delay: Duration) {
        lock(&self.shared).open_delay = delay;
    }

    /// Latency applied to every `write`.
    pub fn set_write_delay(&self, delay: Duration) {
        lock(&self.shared).write_delay = delay;
    }

    /// Whether a link is currently up.
    pub fn is_linked(&self) -> bool {
        lock(&self.shared)
            .active
            .as_ref()
            .is_some_and(|active| active.linked.load(Ordering::SeqCst))
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        lock(&self.shared).opens
    }

    /// Payloads accepted so far, in order.
    pub fn written(&self) -> Vec<Bytes> {
        lock(&self.shared).written.clone()
    }

    /// Accepted payloads decoded as UTF-8 (lossy).
    pub fn written_text(&self) -> Vec<String> {
        lock(&self.shared)
            .written
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    /// Everything the host did, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.shared).journal.clone()
    }
}
