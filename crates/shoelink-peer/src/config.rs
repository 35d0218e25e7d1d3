use std::time::Duration;

use serde::{Deserialize, Serialize};
use shoelink_frame::FrameConfig;
use shoelink_transport::DiscoveryFilter;

/// Per-channel behavior.
///
/// The settle delays give the firmware time after connecting and after each
/// write. Nothing in the protocol requires them, so they default to zero;
/// [`ChannelConfig::wireless`] restores the timings the wireless firmware was
/// tuned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Pause after a link is established, before the channel reports connected.
    pub connect_settle_ms: u64,
    /// Pause after each successful write, before the next operation may run.
    pub write_settle_ms: u64,
    /// Terminate outgoing commands with `\n`.
    pub append_newline: bool,
    /// Incoming line framing.
    pub frame: FrameConfig,
    /// Device selection filter handed to the transport.
    pub filter: Option<DiscoveryFilter>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_settle_ms: 0,
            write_settle_ms: 0,
            append_newline: false,
            frame: FrameConfig::default(),
            filter: None,
        }
    }
}

impl ChannelConfig {
    /// Wireless UART: trimmed commands without terminator, 1 s / 200 ms settle.
    pub fn wireless() -> Self {
        Self {
            connect_settle_ms: 1000,
            write_settle_ms: 200,
            append_newline: false,
            frame: FrameConfig::default(),
            filter: Some(DiscoveryFilter::nordic_uart()),
        }
    }

    /// Serial line: newline-terminated commands, no settle delays.
    pub fn serial() -> Self {
        Self {
            append_newline: true,
            ..Self::default()
        }
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    pub fn write_settle(&self) -> Duration {
        Duration::from_millis(self.write_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_delays() {
        let config = ChannelConfig::default();
        assert!(config.connect_settle().is_zero());
        assert!(config.write_settle().is_zero());
        assert!(!config.append_newline);
    }

    #[test]
    fn presets() {
        let wireless = ChannelConfig::wireless();
        assert_eq!(wireless.connect_settle(), Duration::from_secs(1));
        assert_eq!(wireless.write_settle(), Duration::from_millis(200));
        assert!(wireless.filter.is_some());

        assert!(ChannelConfig::serial().append_newline);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"append_newline": true, "frame": {"max_line_len": 512}}"#)
                .unwrap();
        assert!(config.append_newline);
        assert_eq!(config.frame.max_line_len, 512);
        assert_eq!(config.write_settle_ms, 0);
    }
}
