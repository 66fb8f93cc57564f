//! SMTP submission with opportunistic STARTTLS.
//!
//! [`connection::serve`] runs one session over an already accepted stream:
//! bytes are framed into CRLF lines ([`framer`]), parsed ([`command`]) and
//! fed to the per-connection state machine ([`session`]). Completed message
//! bodies go to a [`store::MessageSink`]; STARTTLS swaps the plaintext
//! [`transport::Transport`] for a TLS one and drops anything the client sent
//! in cleartext after the STARTTLS line.

pub mod command;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod error;
pub mod framer;
pub mod logging;
pub mod ratelimiter;
pub mod reply;
pub mod server;
pub mod session;
pub mod store;
pub mod tls;
pub mod transport;

pub use connection::{serve, Closed, ConnectionContext, Limits};
pub use error::{ConnectionError, SmtpError};
pub use reply::Reply;
pub use session::{Action, Message, Session, SessionId, State};
pub use store::{DirSink, MessageSink, StoreError};
pub use tls::{TlsError, TlsUpgrade};
