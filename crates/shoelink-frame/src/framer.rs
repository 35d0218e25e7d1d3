use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::channel::ChannelName;
use crate::codec::{FrameConfig, LineCodec, Message};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Turns one channel's raw chunks into [`Message`]s.
///
/// Holds the carry-over fragment between chunks. Messages come out in byte
/// arrival order and each line is emitted once.
#[derive(Debug)]
pub struct LineFramer {
    channel: ChannelName,
    codec: LineCodec,
    buf: BytesMut,
}

impl LineFramer {
    pub fn new(channel: ChannelName) -> Self {
        Self::with_config(channel, &FrameConfig::default())
    }

    pub fn with_config(channel: ChannelName, config: &FrameConfig) -> Self {
        Self {
            channel,
            codec: LineCodec::with_config(config, false),
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Feed a chunk and hand every completed message to `emit`.
    ///
    /// On `LineTooLong` the messages completed before the overflow have
    /// already been emitted and the carry-over is gone.
    pub fn feed_with(&mut self, chunk: &[u8], mut emit: impl FnMut(Message)) -> Result<()> {
        trace!(channel = %self.channel, len = chunk.len(), "framer chunk");
        self.buf.extend_from_slice(chunk);
        while let Some(text) = self.codec.decode(&mut self.buf)? {
            emit(Message::new(self.channel.clone(), text));
        }
        Ok(())
    }

    /// Feed a chunk and collect the completed messages.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        self.feed_with(chunk, |message| out.push(message))?;
        Ok(out)
    }

    /// Drop the carry-over fragment. Partial data never survives a reconnect.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(
                channel = %self.channel,
                discarded = self.buf.len(),
                "discarding partial message"
            );
        }
        self.buf.clear();
        self.codec.reset();
    }

    /// Bytes waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::text).collect()
    }

    #[test]
    fn carries_partial_line_into_next_chunk() {
        let mut framer = LineFramer::new(ChannelName::left());

        let first = framer.feed(b"abc\nde").unwrap();
        let second = framer.feed(b"f\n").unwrap();

        assert_eq!(texts(&first), vec!["abc"]);
        assert_eq!(texts(&second), vec!["def"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn blank_lines_produce_nothing() {
        let mut framer = LineFramer::new(ChannelName::single());
        assert!(framer.feed(b"\n\n").unwrap().is_empty());
    }

    #[test]
    fn messages_carry_channel_name() {
        let mut framer = LineFramer::new(ChannelName::right());
        let messages = framer.feed(b"step:1\nstep:2\n").unwrap();

        assert_eq!(texts(&messages), vec!["step:1", "step:2"]);
        assert!(messages.iter().all(|m| m.channel() == &ChannelName::right()));
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let mut framer = LineFramer::new(ChannelName::left());
        let mut all = Vec::new();
        for byte in b"heel\r\ntoe\n" {
            all.extend(framer.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(texts(&all), vec!["heel", "toe"]);
    }

    #[test]
    fn reset_discards_partial_message() {
        let mut framer = LineFramer::new(ChannelName::left());
        assert!(framer.feed(b"half-a-mess").unwrap().is_empty());
        assert_eq!(framer.pending_len(), 11);

        framer.reset();
        let messages = framer.feed(b"age\nfresh\n").unwrap();
        assert_eq!(texts(&messages), vec!["age", "fresh"]);
    }

    #[test]
    fn overflow_keeps_earlier_messages() {
        let config = FrameConfig { max_line_len: 8 };
        let mut framer = LineFramer::with_config(ChannelName::left(), &config);
        let mut seen = Vec::new();

        let result = framer.feed_with(b"ok\nthis-tail-is-too-long", |m| seen.push(m));

        assert!(matches!(result, Err(FrameError::LineTooLong { .. })));
        assert_eq!(texts(&seen), vec!["ok"]);
        assert_eq!(framer.pending_len(), 0);
    }
}
