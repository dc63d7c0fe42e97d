use crate::protocol::ReplyStatus;
use std::io;
use thiserror::Error;

/// Error is the unified error type for the SOCKS5 client and the HTTP bridge
#[derive(Error, Debug)]
pub enum Error {
    // SOCKS5 protocol errors
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    // Connection errors
    #[error("SOCKS5 server failed to establish the connection: {0}")]
    ConnectionRejected(ReplyStatus),

    #[error("connection closed by server before completion")]
    ClosedByServer,

    #[error("failed to reach SOCKS5 server: {0}")]
    Unreachable(#[source] io::Error),

    // HTTP front end errors
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type alias for socksbridge operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// is_connection_error groups every failure that means the upstream
    /// tunnel could not be opened or was lost mid-handshake
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectionRejected(_) | Error::ClosedByServer | Error::Unreachable(_)
        )
    }

    /// reply_status returns the SOCKS5 reply status carried by a rejected connection
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        match self {
            Error::ConnectionRejected(status) => Some(*status),
            _ => None,
        }
    }

    /// from_handshake_io maps I/O failures that occur while talking to the SOCKS5 server.
    /// A short read or a zero-length write means the server hung up early.
    pub(crate) fn from_handshake_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => Error::ClosedByServer,
            _ => Error::Io(e),
        }
    }
}
