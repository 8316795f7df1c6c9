use thiserror::Error;

/// Errors raised by the framed transport, covering both the connection
/// itself and the framing layered on top of it.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection idle for longer than the configured timeout")]
    IdleTimeout,
    #[error("stream ended before the declared frame length")]
    Truncated,
    #[error("payload of {0} bytes does not fit a u32 length prefix")]
    FrameTooLarge(usize),
    #[error("malformed control frame: {0}")]
    Json(#[from] serde_json::Error),
}
