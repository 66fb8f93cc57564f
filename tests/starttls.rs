mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{command, context, read_reply, short_idle, start, stored};
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};
use smtp_intake::{Closed, ConnectionError, TlsUpgrade};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

struct TestPki {
    server: TlsUpgrade,
    connector: TlsConnector,
}

fn pki() -> TestPki {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = cert.der().to_vec();

    let server = TlsUpgrade::from_der(vec![cert_der.clone()], key_pair.serialize_der()).unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(&Certificate(cert_der)).unwrap();
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TestPki {
        server,
        connector: TlsConnector::from(Arc::new(config)),
    }
}

async fn handshake(connector: &TlsConnector, stream: DuplexStream) -> TlsStream<DuplexStream> {
    let name = ServerName::try_from("localhost").unwrap();
    connector.connect(name, stream).await.unwrap()
}

#[tokio::test]
async fn cleartext_transaction_with_tls_configured() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let (mut client, handle) = start(context(dir.path(), Some(pki.server.clone())));

    assert_eq!(read_reply(&mut client).await, "220 mx.test smtp-intake test\r\n");
    assert_eq!(
        command(&mut client, "EHLO a").await,
        "250-Hello\r\n250 STARTTLS\r\n"
    );
    assert_eq!(command(&mut client, "MAIL FROM:<x@y>").await, "250 OK\r\n");
    assert_eq!(command(&mut client, "RCPT TO:<z@y>").await, "250 OK\r\n");
    assert!(command(&mut client, "DATA").await.starts_with("354 "));
    client.write_all(b"Hello\r\n").await.unwrap();
    assert_eq!(command(&mut client, ".").await, "250 OK\r\n");
    assert_eq!(command(&mut client, "QUIT").await, "221 Bye\r\n");

    assert_eq!(handle.await.unwrap().unwrap(), Closed::Quit);
    let messages = stored(dir.path());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, b"Hello\r\n");
}

#[tokio::test]
async fn message_is_received_over_the_upgraded_channel() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let (mut client, handle) = start(context(dir.path(), Some(pki.server.clone())));

    read_reply(&mut client).await;
    assert_eq!(
        command(&mut client, "EHLO a").await,
        "250-Hello\r\n250 STARTTLS\r\n"
    );
    assert_eq!(
        command(&mut client, "STARTTLS").await,
        "220 Ready to start TLS\r\n"
    );

    let mut tls = handshake(&pki.connector, client).await;
    assert_eq!(command(&mut tls, "EHLO a").await, "250 Hello\r\n");
    assert_eq!(
        command(&mut tls, "STARTTLS").await,
        "503 Bad sequence of commands\r\n"
    );
    assert_eq!(command(&mut tls, "MAIL FROM:<x@y>").await, "250 OK\r\n");
    assert_eq!(command(&mut tls, "RCPT TO:<z@y>").await, "250 OK\r\n");
    command(&mut tls, "DATA").await;
    tls.write_all(b"Secret\r\n").await.unwrap();
    assert_eq!(command(&mut tls, ".").await, "250 OK\r\n");
    assert_eq!(command(&mut tls, "QUIT").await, "221 Bye\r\n");

    assert_eq!(handle.await.unwrap().unwrap(), Closed::Quit);
    let messages = stored(dir.path());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, b"Secret\r\n");
}

#[tokio::test]
async fn plaintext_pipelined_after_starttls_is_never_executed() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let (mut client, handle) = start(context(dir.path(), Some(pki.server.clone())));

    read_reply(&mut client).await;
    command(&mut client, "EHLO a").await;
    client
        .write_all(b"STARTTLS\r\nMAIL FROM:<evil@x>\r\nRCPT TO:<victim@x>\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client).await, "220 Ready to start TLS\r\n");

    let mut tls = handshake(&pki.connector, client).await;
    assert_eq!(
        command(&mut tls, "DATA").await,
        "503 Bad sequence of commands\r\n"
    );
    assert_eq!(
        command(&mut tls, "RCPT TO:<z@y>").await,
        "503 Bad sequence of commands\r\n"
    );
    assert_eq!(command(&mut tls, "QUIT").await, "221 Bye\r\n");
    assert_eq!(handle.await.unwrap().unwrap(), Closed::Quit);
}

#[tokio::test]
async fn starttls_after_mail_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let (mut client, handle) = start(context(dir.path(), Some(pki.server.clone())));

    read_reply(&mut client).await;
    command(&mut client, "EHLO a").await;
    command(&mut client, "MAIL FROM:<x@y>").await;
    assert_eq!(
        command(&mut client, "STARTTLS").await,
        "503 Bad sequence of commands\r\n"
    );
    command(&mut client, "QUIT").await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_handshake_closes_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let (mut client, handle) = start(context(dir.path(), Some(pki.server.clone())));

    read_reply(&mut client).await;
    command(&mut client, "EHLO a").await;
    assert_eq!(
        command(&mut client, "STARTTLS").await,
        "220 Ready to start TLS\r\n"
    );
    client.write_all(b"this is not a TLS ClientHello\r\n").await.unwrap();
    client.shutdown().await.unwrap();

    assert!(matches!(
        handle.await.unwrap(),
        Err(ConnectionError::Handshake(_))
    ));
    let mut rest = Vec::new();
    let _ = client.read_to_end(&mut rest).await;
    assert!(!String::from_utf8_lossy(&rest).contains("250"));
    assert!(stored(dir.path()).is_empty());
}

#[tokio::test]
async fn silent_client_after_starttls_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let pki = pki();
    let ctx = short_idle(
        context(dir.path(), Some(pki.server.clone())),
        Duration::from_millis(100),
    );
    let (mut client, handle) = start(ctx);

    read_reply(&mut client).await;
    command(&mut client, "EHLO a").await;
    assert_eq!(
        command(&mut client, "STARTTLS").await,
        "220 Ready to start TLS\r\n"
    );

    // no ClientHello; the client stays connected
    let finished = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("handshake was not bounded");
    assert!(matches!(
        finished.unwrap(),
        Err(ConnectionError::IdleTimeout(_))
    ));
    drop(client);
    assert!(stored(dir.path()).is_empty());
}
