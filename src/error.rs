use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("incomplete message")]
    IncompleteMessage,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("out of the buffer: capacity is {cap} required is at least {required}")]
    CapacityExceeded { cap: usize, required: usize },
    #[error("punch server did not assign an id")]
    EnrollTimeout,
    #[error("peer not found or offline")]
    PeerNotFound,
    #[error("no peer answered before the punch deadline")]
    PunchTimeout,
    #[error("punch server closed the connection")]
    Disconnected,
    #[error("punch server reader is owned by the notification listener")]
    ReaderTaken,
    #[error("shutdown")]
    Shutdown,
}

impl Error {
    pub(crate) fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Maps an early EOF while reading a fixed-size record to `IncompleteMessage`.
    pub(crate) fn from_read(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::IncompleteMessage,
            _ => Error::Io(e),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
