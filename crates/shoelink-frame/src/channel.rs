//! Channel names.
//!
//! A channel is one physically connected device. The single-device setup
//! uses [`ChannelName::DEFAULT`]; a pair of shoes uses [`ChannelName::LEFT`]
//! and [`ChannelName::RIGHT`]. Any other name is application-defined.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a device channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// The implicit channel of a single-device setup.
    pub const DEFAULT: &'static str = "default";
    /// Left shoe.
    pub const LEFT: &'static str = "left";
    /// Right shoe.
    pub const RIGHT: &'static str = "right";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn single() -> Self {
        Self::new(Self::DEFAULT)
    }

    pub fn left() -> Self {
        Self::new(Self::LEFT)
    }

    pub fn right() -> Self {
        Self::new(Self::RIGHT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `default`, `left` and `right`.
    pub fn is_builtin(&self) -> bool {
        matches!(self.0.as_str(), Self::DEFAULT | Self::LEFT | Self::RIGHT)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ChannelName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
