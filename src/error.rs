use thiserror::Error;

use crate::framer::FrameError;

/// Recoverable protocol errors. Each one is answered with a reply and the
/// session keeps its previous state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmtpError {
    #[error("command sent before HELO/EHLO")]
    NotGreeted,

    #[error("bad sequence of commands")]
    BadSequence,

    #[error("unrecognized command")]
    Unrecognized,

    #[error("syntax error in parameters")]
    Syntax,

    #[error("TLS not available")]
    TlsUnavailable,

    #[error("message exceeds {max} bytes")]
    MessageTooLarge { max: usize },
}

/// Errors that end a connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("transport is already encrypted")]
    AlreadySecure,

    #[error("no activity for {0} seconds")]
    IdleTimeout(u64),
}
