use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Switch the firmware to MIDI output.
pub const MODE_MIDI: &str = "mode:midi";
/// Switch the firmware to HID (keyboard) output.
pub const MODE_HID: &str = "mode:hid";
/// Prefix of the key-mapping command: `setKeymap:<index>:<keyCode>`.
pub const SET_KEYMAP: &str = "setKeymap";

/// Firmware output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Midi,
    Hid,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Midi => "midi",
            Mode::Hid => "hid",
        }
    }

    /// Wire command selecting this mode.
    pub fn command(self) -> &'static str {
        match self {
            Mode::Midi => MODE_MIDI,
            Mode::Hid => MODE_HID,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode '{0}' (expected 'midi' or 'hid')")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midi" => Ok(Mode::Midi),
            "hid" => Ok(Mode::Hid),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Application-level command carried over a channel.
///
/// Commands are opaque to the channel layer; `index` and `key_code` ranges
/// are the caller's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SetMode { mode: Mode },
    SetKeymap { index: u32, key_code: u32 },
    Raw { text: String },
}

impl Command {
    pub fn set_mode(mode: Mode) -> Self {
        Self::SetMode { mode }
    }

    pub fn set_keymap(index: u32, key_code: u32) -> Self {
        Self::SetKeymap { index, key_code }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw { text: text.into() }
    }

    /// The text written to the device, without any line terminator.
    pub fn to_wire(&self) -> String {
        match self {
            Command::SetMode { mode } => mode.command().to_string(),
            Command::SetKeymap { index, key_code } => format!("{SET_KEYMAP}:{index}:{key_code}"),
            Command::Raw { text } => text.clone(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_commands() {
        assert_eq!(Command::set_mode(Mode::Midi).to_wire(), "mode:midi");
        assert_eq!(Command::set_mode(Mode::Hid).to_wire(), "mode:hid");
    }

    #[test]
    fn keymap_command() {
        assert_eq!(Command::set_keymap(3, 44).to_wire(), "setKeymap:3:44");
    }

    #[test]
    fn raw_command_is_passed_through() {
        assert_eq!(Command::raw("calibrate").to_string(), "calibrate");
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("MIDI".parse::<Mode>().unwrap(), Mode::Midi);
        assert_eq!(" hid ".parse::<Mode>().unwrap(), Mode::Hid);
        assert!("serial".parse::<Mode>().is_err());
    }

    #[test]
    fn command_serde_shape() {
        let json = serde_json::to_value(Command::set_keymap(1, 2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "set_keymap", "index": 1, "key_code": 2})
        );
    }
}
