/// Errors that can occur while reading framed messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading from the stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before any line of a new message arrived.
    #[error("connection closed (no message data)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
