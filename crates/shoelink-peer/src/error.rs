use shoelink_frame::{ChannelName, FrameError};
use shoelink_transport::{ErrorKind, TransportError};

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing error on incoming data.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The operation needs a connected channel.
    #[error("channel {0} is not connected")]
    NotConnected(ChannelName),

    /// No channel with this name and no transport to create one.
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    /// Unexpected defect (aborted operation, closed queue).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PeerError {
    /// Failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeerError::Transport(err) => err.kind(),
            PeerError::NotConnected(_) => ErrorKind::NotConnected,
            PeerError::Frame(_) | PeerError::UnknownChannel(_) | PeerError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_passes_through() {
        let err = PeerError::from(TransportError::UserCancelled);
        assert_eq!(err.kind(), ErrorKind::UserCancelled);

        let err = PeerError::from(TransportError::NotConnected);
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn frame_errors_are_internal() {
        let err = PeerError::from(FrameError::LineTooLong { len: 10, max: 4 });
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn not_connected_names_channel() {
        let err = PeerError::NotConnected(ChannelName::left());
        assert_eq!(err.to_string(), "channel left is not connected");
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }
}
