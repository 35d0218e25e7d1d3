use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Nordic UART service exposed by the shoe firmware.
pub const NORDIC_UART_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
/// App -> device characteristic (write).
pub const NORDIC_UART_RX: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
/// Device -> app characteristic (notify).
pub const NORDIC_UART_TX: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Raw bytes received from the device. Chunk boundaries carry no meaning.
    Chunk(Bytes),
    /// The link went away without a `close` from our side.
    Dropped { reason: Option<String> },
}

/// Receiving end of a link's incoming stream.
///
/// The stream ending is equivalent to [`LinkEvent::Dropped`].
pub type Incoming = mpsc::UnboundedReceiver<LinkEvent>;

/// Sending end used by bindings to feed [`Incoming`].
pub type IncomingSender = mpsc::UnboundedSender<LinkEvent>;

/// Create a fresh incoming stream pair.
pub fn incoming_channel() -> (IncomingSender, Incoming) {
    mpsc::unbounded_channel()
}

/// Narrows which device `open` may pick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryFilter {
    /// Only accept devices whose advertised name starts with this prefix.
    pub name_prefix: Option<String>,
    /// Service identifiers the device must expose.
    pub services: Vec<String>,
}

impl DiscoveryFilter {
    /// Filter for devices exposing the Nordic UART service.
    pub fn nordic_uart() -> Self {
        Self {
            name_prefix: None,
            services: vec![NORDIC_UART_SERVICE.to_string()],
        }
    }

    /// Whether a device with `name` and `services` passes this filter.
    pub fn matches(&self, name: &str, services: &[&str]) -> bool {
        if let Some(prefix) = &self.name_prefix {
            if !name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.services
            .iter()
            .all(|wanted| services.iter().any(|s| s.eq_ignore_ascii_case(wanted)))
    }
}

/// Device discovery and link establishment for one physical channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// Select a device and establish a link to it.
    ///
    /// Fails with `NotAvailable`, `UserCancelled` or a link-level error.
    async fn open(&self, filter: Option<&DiscoveryFilter>) -> Result<Box<dyn Link>>;
}

/// An established link to a single device.
///
/// All calls take `&self`; at most one write or close is outstanding at a
/// time because the owning channel serializes them.
#[async_trait]
pub trait Link: Send + Sync {
    /// Hand out the incoming stream. Returns `None` after the first call.
    fn subscribe(&mut self) -> Option<Incoming>;

    /// Write a complete payload to the device.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Tear the link down. Errors are informational only.
    async fn close(&self) -> Result<()>;

    /// Whether the binding still reports an active link.
    fn is_linked(&self) -> bool;
}
