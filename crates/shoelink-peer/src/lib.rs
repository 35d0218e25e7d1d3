//! Device channels for shoelink.
//!
//! A [`ChannelManager`] owns one device link: it serializes every operation
//! on that link, frames incoming bytes into messages and tracks the
//! connection lifecycle. A [`Coordinator`] groups named channels (one shoe
//! or a left/right pair) behind a shared [`EventBus`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shoelink_peer::{ChannelConfig, Coordinator, Mode};
//! use shoelink_transport::UnixSocketTransport;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Coordinator::dual(
//!     Arc::new(UnixSocketTransport::new("/tmp/shoe-left.sock")),
//!     Arc::new(UnixSocketTransport::new("/tmp/shoe-right.sock")),
//!     ChannelConfig::default(),
//! );
//! coordinator.connect_all().await?;
//! coordinator.set_mode_all(Mode::Midi).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod manager;
pub mod queue;

pub use command::{Command, Mode, ParseModeError, MODE_HID, MODE_MIDI, SET_KEYMAP};
pub use config::ChannelConfig;
pub use coordinator::{ChannelOutcome, Coordinator, GroupError, GroupReport, GroupResult};
pub use error::{PeerError, Result};
pub use events::{
    BoxError, Event, EventBus, EventKind, EventPayload, MessageStream, SubscriptionId,
};
pub use manager::{ChannelManager, ChannelState, ChannelStatus, ErrorInfo, OpFuture};
pub use queue::OperationQueue;
