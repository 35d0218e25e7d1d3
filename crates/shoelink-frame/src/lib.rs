//! Newline-delimited message framing for device channels.
//!
//! Device firmware writes text lines terminated by `\n`. Chunks arrive with
//! arbitrary boundaries; [`LineFramer`] keeps the partial tail per channel and
//! yields one [`Message`] per complete, non-blank line.
//!
//! No partial lines, no buffer management in user code.

pub mod channel;
pub mod codec;
pub mod error;
pub mod framer;

pub use channel::ChannelName;
pub use codec::{
    encode_command, FrameConfig, LineCodec, Message, DEFAULT_MAX_LINE_LEN, DELIMITER,
};
pub use error::{FrameError, Result};
pub use framer::LineFramer;
