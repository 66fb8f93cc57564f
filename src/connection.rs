//! Drives one accepted connection: bytes in, lines through the session, replies out.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{ConnectionError, SmtpError};
use crate::framer::LineFramer;
use crate::logging::escape_untrusted;
use crate::reply::Reply;
use crate::session::{Action, Message, Session, State};
use crate::store::MessageSink;
use crate::tls::TlsUpgrade;
use crate::transport::Transport;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_line_length: usize,
    pub max_message_size: usize,
    pub idle_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: 1000,
            max_message_size: 10 * 1024 * 1024,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Everything a connection needs that is shared across connections.
#[derive(Clone)]
pub struct ConnectionContext {
    pub hostname: String,
    pub banner: String,
    pub tls: Option<TlsUpgrade>,
    pub sink: Arc<dyn MessageSink>,
    pub limits: Limits,
}

/// How a connection ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// The client sent QUIT.
    Quit,
    /// The client closed its side of the stream.
    PeerClosed,
}

/// Serves one connection until QUIT, peer close or a fatal error.
///
/// `stream` must be the raw accepted stream with no buffering layer on top,
/// otherwise plaintext read ahead of a STARTTLS could not be discarded.
pub async fn serve<S>(stream: S, ctx: &ConnectionContext) -> Result<Closed, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(ctx.tls.is_some(), ctx.limits.max_message_size);
    let span = info_span!("session", id = %session.id());

    async {
        info!("session started");
        let result = run(stream, &mut session, ctx).await;
        if session.state() == State::ReceivingData {
            warn!("connection ended during DATA, message discarded");
        }
        match &result {
            Ok(closed) => info!(?closed, "session ended"),
            Err(e) => warn!("session aborted: {}", e),
        }
        result
    }
    .instrument(span)
    .await
}

async fn run<S>(
    stream: S,
    session: &mut Session,
    ctx: &ConnectionContext,
) -> Result<Closed, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut transport = Transport::Plain(stream);
    let mut framer = LineFramer::new(ctx.limits.max_line_length);
    let mut buf = vec![0u8; READ_CHUNK];

    send(&mut transport, &Reply::greeting(&ctx.hostname, &ctx.banner)).await?;

    loop {
        let line = match framer.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                let read = time::timeout(ctx.limits.idle_timeout, transport.read(&mut buf)).await;
                let n = match read {
                    Ok(n) => n?,
                    Err(_) => {
                        send(&mut transport, &Reply::idle_timeout(&ctx.hostname)).await?;
                        let _ = transport.shutdown().await;
                        return Err(ConnectionError::IdleTimeout(
                            ctx.limits.idle_timeout.as_secs(),
                        ));
                    }
                };
                if n == 0 {
                    if framer.pending() > 0 {
                        debug!("peer closed with {} bytes of unterminated input", framer.pending());
                    }
                    return Ok(Closed::PeerClosed);
                }
                framer.push(&buf[..n]);
                continue;
            }
            Err(e) => {
                send(&mut transport, &Reply::line_too_long()).await?;
                let _ = transport.shutdown().await;
                return Err(e.into());
            }
        };

        if session.state() != State::ReceivingData {
            debug!(">> {}", escape_untrusted(&String::from_utf8_lossy(&line)));
        }

        match session.handle_line(&line) {
            Action::None => {}

            Action::Reply(reply) => send(&mut transport, &reply).await?,

            Action::Deliver(message) => {
                let reply = deliver(ctx.sink.as_ref(), &message).await;
                send(&mut transport, &reply).await?;
            }

            Action::StartTls(reply) => {
                let Some(tls) = ctx.tls.as_ref() else {
                    send(&mut transport, &Reply::from(&SmtpError::TlsUnavailable)).await?;
                    continue;
                };
                send(&mut transport, &reply).await?;
                let dropped = framer.discard();
                if dropped > 0 {
                    warn!("discarded {} bytes of plaintext sent after STARTTLS", dropped);
                }
                // no 421 on expiry, the stream is neither plaintext nor TLS any more
                transport = time::timeout(ctx.limits.idle_timeout, transport.upgrade(tls))
                    .await
                    .map_err(|_| ConnectionError::IdleTimeout(ctx.limits.idle_timeout.as_secs()))??;
                session.mark_secure();
                info!("transport upgraded to TLS");
            }

            Action::Close(reply) => {
                send(&mut transport, &reply).await?;
                let _ = transport.shutdown().await;
                return Ok(Closed::Quit);
            }
        }
    }
}

async fn deliver(sink: &dyn MessageSink, message: &Message) -> Reply {
    match sink.append(&message.id, &message.body).await {
        Ok(()) => {
            info!(
                message = %message.id,
                from = %escape_untrusted(&message.sender),
                recipients = message.recipients.len(),
                bytes = message.body.len(),
                "message stored"
            );
            Reply::ok()
        }
        Err(e) => {
            error!(message = %message.id, "failed to store message: {}", e);
            Reply::local_error()
        }
    }
}

async fn send<W>(writer: &mut W, reply: &Reply) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let wire = reply.to_string();
    if reply.is_positive() {
        debug!("<< {}", wire.trim_end());
    } else {
        info!("<< {}", wire.trim_end());
    }
    writer.write_all(wire.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
