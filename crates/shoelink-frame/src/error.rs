/// Errors that can occur while framing device output.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The carry-over buffer grew past the limit without a delimiter.
    #[error("line too long ({len} bytes without a newline, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// An I/O error surfaced through a codec-driven reader or writer.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
