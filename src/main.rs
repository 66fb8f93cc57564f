use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::info;

use smtp_intake::config::Opt;
use smtp_intake::server::SmtpServer;
use smtp_intake::{daemon, logging};

fn main() -> Result<()> {
    let opt = Opt::from_args();

    if opt.daemon {
        // the runtime must be created in the detached child
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        daemon::daemonize(&cwd)?;
    }

    logging::init(opt.verbose, opt.log_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(async {
        let server = Arc::new(SmtpServer::new(opt)?);

        info!("smtp-intake v{} started", env!("CARGO_PKG_VERSION"));
        info!("PID: {}", std::process::id());
        info!("Ports: {:?}", server.opt.ports);
        info!("Data directory: {:?}", server.opt.data_dir);
        info!("STARTTLS: {}", if server.starttls_enabled() { "enabled" } else { "disabled" });
        info!("Max connections per minute per IP: {}", server.opt.max_connections_per_minute);

        server.run().await
    })
}
