//! Device link abstraction for shoelink.
//!
//! A [`Transport`] selects a device and opens a [`Link`] to it; the link
//! carries raw bytes both ways and reports unsolicited drops on its incoming
//! stream. Bindings:
//! - [`MemoryTransport`] - in-process device, scriptable from the device side
//! - [`UnixSocketTransport`] - firmware emulators and UART bridges (Unix)
//! - `SerialTransport` - serial ports (behind the `serial` feature)
//!
//! This is the lowest layer of shoelink. Nothing here serializes operations;
//! that is the job of the owning channel.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(unix)]
pub mod uds;

pub use error::{ErrorKind, Result, TransportError};
pub use memory::{JournalEntry, MemoryDevice, MemoryTransport, ScriptedFailure};
pub use traits::{
    incoming_channel, DiscoveryFilter, Incoming, IncomingSender, Link, LinkEvent, Transport,
    NORDIC_UART_RX, NORDIC_UART_SERVICE, NORDIC_UART_TX,
};

#[cfg(feature = "serial")]
pub use serial::{SerialSettings, SerialTransport, DEFAULT_BAUD_RATE};
#[cfg(unix)]
pub use uds::UnixSocketTransport;
