//! Host-side link to instrumented shoe controllers.
//!
//! shoelink talks to one shoe, or a left/right pair, over whatever link the
//! host has: a serial port, a Unix socket bridge or an in-process device.
//! Each shoe is a channel with its own serialized operation queue; incoming
//! bytes are framed into newline-delimited messages and delivered as events.
//!
//! # Crate Structure
//!
//! - [`transport`]: device links (memory, Unix socket, serial behind `serial`)
//! - [`frame`]: line framing and channel names
//! - [`peer`]: channels, the coordinator and the event bus (behind `peer`)

/// Re-export transport types.
pub mod transport {
    pub use shoelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use shoelink_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use shoelink_peer::*;
}
