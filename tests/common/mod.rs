#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use smtp_intake::{serve, Closed, ConnectionContext, ConnectionError, DirSink, Limits, TlsUpgrade};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

pub type ServerHandle = JoinHandle<Result<Closed, ConnectionError>>;

pub fn context(data_dir: &Path, tls: Option<TlsUpgrade>) -> ConnectionContext {
    ConnectionContext {
        hostname: "mx.test".to_string(),
        banner: "smtp-intake test".to_string(),
        tls,
        sink: Arc::new(DirSink::new(data_dir)),
        limits: Limits::default(),
    }
}

/// Starts a session on an in-memory stream and returns the client end.
pub fn start(ctx: ConnectionContext) -> (DuplexStream, ServerHandle) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(async move { serve(server, &ctx).await });
    (client, handle)
}

/// Reads one complete (possibly multi-line) reply, one byte at a time so
/// nothing past the reply is consumed.
pub async fn read_reply<R: AsyncRead + Unpin>(reader: &mut R) -> String {
    let mut reply = Vec::new();
    loop {
        let mut line = Vec::new();
        while !line.ends_with(b"\r\n") {
            line.push(reader.read_u8().await.expect("connection closed mid-reply"));
        }
        let last = line.get(3) == Some(&b' ');
        reply.extend_from_slice(&line);
        if last {
            return String::from_utf8(reply).expect("reply is not UTF-8");
        }
    }
}

pub async fn command<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, line: &str) -> String {
    stream
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .unwrap();
    read_reply(stream).await
}

/// Every stored message in `dir`, sorted by file name.
pub fn stored(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "eml"))
        .map(|path| {
            let body = std::fs::read(&path).unwrap();
            (path, body)
        })
        .collect();
    files.sort();
    files
}

pub fn short_idle(mut ctx: ConnectionContext, idle: Duration) -> ConnectionContext {
    ctx.limits.idle_timeout = idle;
    ctx
}
