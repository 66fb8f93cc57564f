use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Opt;
use crate::connection::{self, ConnectionContext};
use crate::ratelimiter::RateLimiter;
use crate::reply::Reply;
use crate::store::DirSink;
use crate::tls::TlsUpgrade;

pub struct SmtpServer {
    pub opt: Opt,
    context: ConnectionContext,
    rate_limiter: Mutex<RateLimiter>,
}

impl SmtpServer {
    /// Prepares the data directory and loads TLS once for the whole process.
    pub fn new(opt: Opt) -> Result<Self> {
        if !opt.data_dir.exists() {
            std::fs::create_dir_all(&opt.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", opt.data_dir))?;
            info!("Data directory created: {:?}", opt.data_dir);
        }

        let tls = match (&opt.tls_cert, &opt.tls_key) {
            (Some(cert_path), Some(key_path)) => {
                let tls = TlsUpgrade::from_pem_files(cert_path, key_path)
                    .context("Failed to load TLS certificate")?;
                info!("STARTTLS enabled with certificate: {:?}", cert_path);
                Some(tls)
            }
            (None, None) => None,
            _ => {
                warn!("Both --tls-cert and --tls-key are needed, STARTTLS disabled");
                None
            }
        };

        let context = ConnectionContext {
            hostname: opt.hostname.clone(),
            banner: opt.banner.clone(),
            tls,
            sink: Arc::new(DirSink::new(opt.data_dir.clone())),
            limits: opt.limits(),
        };

        Ok(Self {
            rate_limiter: Mutex::new(RateLimiter::new(opt.max_connections_per_minute)),
            opt,
            context,
        })
    }

    pub fn starttls_enabled(&self) -> bool {
        self.context.tls.is_some()
    }

    pub async fn handle_client(&self, mut stream: TcpStream, client_addr: SocketAddr) {
        let allowed = self.rate_limiter.lock().await.check_and_add(client_addr.ip());
        if !allowed {
            warn!(
                "Rate limit exceeded ({} per minute)",
                self.opt.max_connections_per_minute
            );
            let refusal = Reply::too_many_connections().to_string();
            let _ = stream.write_all(refusal.as_bytes()).await;
            let _ = stream.shutdown().await;
            return;
        }

        if let Err(e) = connection::serve(stream, &self.context).await {
            info!("Connection closed with error: {}", e);
        }
    }

    async fn run_server(self: Arc<Self>, port: u16) -> Result<()> {
        let addr = format!("{}:{}", self.opt.address, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("Listening on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, client_addr)) => {
                    let this = self.clone();
                    let span = info_span!("client", addr = %client_addr, port);
                    tokio::spawn(
                        async move {
                            info!("New connection");
                            this.handle_client(stream, client_addr).await;
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("Accept error on port {}: {}", port, e);
                }
            }
        }
    }

    /// Serves every configured port until one of the listeners fails.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut handles = vec![];

        for port in self.opt.ports.clone() {
            let this = self.clone();
            handles.push(tokio::spawn(this.run_server(port)));
        }

        for handle in handles {
            handle.await.context("Listener task panicked")??;
        }

        Ok(())
    }
}
