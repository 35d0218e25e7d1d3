use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::channel::ChannelName;
use crate::error::{FrameError, Result};

/// Message delimiter.
pub const DELIMITER: u8 = b'\n';

/// Default limit for a single line: 64 KiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// One decoded line of device output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    channel: ChannelName,
    text: String,
}

impl Message {
    pub fn new(channel: ChannelName, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }

    /// The channel this message arrived on.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Trimmed message text, never empty.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Configuration for line framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Maximum bytes buffered without seeing a delimiter. Default: 64 KiB.
    pub max_line_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Newline codec for device traffic.
///
/// Decoding yields trimmed, non-empty lines; blank lines are skipped.
/// Bytes are split before UTF-8 decoding, so a character split across reads
/// survives, and invalid sequences are replaced rather than rejected.
/// Encoding trims the command and optionally appends the delimiter.
#[derive(Debug, Clone)]
pub struct LineCodec {
    next_index: usize,
    max_line_len: usize,
    append_newline: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default(), false)
    }

    pub fn with_config(config: &FrameConfig, append_newline: bool) -> Self {
        Self {
            next_index: 0,
            max_line_len: config.max_line_len,
            append_newline,
        }
    }

    /// Forget any partial scan state. Call together with clearing the buffer.
    pub fn reset(&mut self) {
        self.next_index = 0;
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let start = self.next_index.min(src.len());
            let Some(offset) = src[start..].iter().position(|b| *b == DELIMITER) else {
                if src.len() > self.max_line_len {
                    let len = src.len();
                    src.clear();
                    self.next_index = 0;
                    return Err(FrameError::LineTooLong {
                        len,
                        max: self.max_line_len,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = start + offset;
            let line = src.split_to(end + 1);
            self.next_index = 0;

            let text = String::from_utf8_lossy(&line[..end]);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        let command = item.trim();
        dst.reserve(command.len() + 1);
        dst.put_slice(command.as_bytes());
        if self.append_newline {
            dst.put_u8(DELIMITER);
        }
        Ok(())
    }
}

/// Encode a command into the exact bytes written to the device.
///
/// Wireless links take the trimmed command as-is; serial links need the
/// trailing newline so the firmware's line reader picks it up.
pub fn encode_command(command: &str, append_newline: bool) -> Bytes {
    let mut codec = LineCodec::with_config(&FrameConfig::default(), append_newline);
    let mut dst = BytesMut::new();
    // Encoding into a BytesMut cannot fail.
    let _ = codec.encode(command, &mut dst);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn decodes_complete_lines_and_keeps_tail() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"abc\nde"[..]);

        assert_eq!(decode_all(&mut codec, &mut buf), vec!["abc".to_string()]);
        assert_eq!(buf.as_ref(), b"de");

        buf.extend_from_slice(b"f\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["def".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn skips_blank_and_whitespace_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n\n  \r\n\tx \r\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["x".to_string()]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut codec = LineCodec::new();
        let snowman = "☃".as_bytes();
        let mut buf = BytesMut::from(&snowman[..1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&snowman[1..]);
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("☃".to_string()));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&[b'a', 0xFF, b'\n'][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("a\u{FFFD}".to_string()));
    }

    #[test]
    fn overlong_tail_is_discarded() {
        let config = FrameConfig { max_line_len: 4 };
        let mut codec = LineCodec::with_config(&config, false);
        let mut buf = BytesMut::from(&b"ok\ntoolong"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("ok".to_string()));
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { len: 7, max: 4 }));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"next\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("next".to_string()));
    }

    #[test]
    fn encode_command_trims() {
        assert_eq!(encode_command("  mode:hid \n", false).as_ref(), b"mode:hid");
    }

    #[test]
    fn encode_command_appends_newline_for_serial() {
        assert_eq!(encode_command("mode:midi", true).as_ref(), b"mode:midi\n");
    }
}
