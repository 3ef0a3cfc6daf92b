//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("malformed line: {0:?}")]
    Malformed(String),

    #[error("line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),

    #[error("server closed the connection")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the connection is unusable after this error.
    ///
    /// Malformed and over-long lines are discarded and reading continues;
    /// everything else means the connection is lost.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Malformed(_) | Self::LineTooLong(_))
    }
}
