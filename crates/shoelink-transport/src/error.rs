use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Coarse failure categories shared by every shoelink layer.
///
/// Every concrete error type in the workspace maps onto exactly one of these,
/// which is what event subscribers and the CLI exit codes key off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The environment lacks the transport capability entirely.
    NotAvailable,
    /// The user aborted a device-selection step.
    UserCancelled,
    /// Transport-level failure during open, write or close.
    LinkError,
    /// An operation needed a connected channel and there was none.
    NotConnected,
    /// Unexpected defect.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotAvailable => "not_available",
            ErrorKind::UserCancelled => "user_cancelled",
            ErrorKind::LinkError => "link_error",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in device transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport capability is missing (no adapter, no such device node).
    #[error("transport not available: {0}")]
    NotAvailable(String),

    /// Device selection was aborted.
    #[error("device selection cancelled")]
    UserCancelled,

    /// The link is not (or no longer) established.
    #[error("link not connected")]
    NotConnected,

    /// Failed to open the link to the given target.
    #[error("failed to open {target}: {source}")]
    Open {
        target: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on an established link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other link-level failure reported by the binding.
    #[error("link error: {0}")]
    Link(String),
}

impl TransportError {
    /// Failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotAvailable(_) => ErrorKind::NotAvailable,
            TransportError::UserCancelled => ErrorKind::UserCancelled,
            TransportError::NotConnected => ErrorKind::NotConnected,
            TransportError::Open { .. } | TransportError::Io(_) | TransportError::Link(_) => {
                ErrorKind::LinkError
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            TransportError::NotAvailable("no adapter".into()).kind(),
            ErrorKind::NotAvailable
        );
        assert_eq!(TransportError::UserCancelled.kind(), ErrorKind::UserCancelled);
        assert_eq!(TransportError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(
            TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).kind(),
            ErrorKind::LinkError
        );
        assert_eq!(
            TransportError::Link("gatt busy".into()).kind(),
            ErrorKind::LinkError
        );
    }

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(ErrorKind::UserCancelled.to_string(), "user_cancelled");
        assert_eq!(ErrorKind::LinkError.to_string(), "link_error");
    }
}
