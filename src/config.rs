use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use crate::connection::Limits;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "smtp-intake",
    about = "A small SMTP submission server with STARTTLS that stores each received message on disk",
    author = "2026, Philippe TEMESI <https://www.tems.be>"
)]
pub struct Opt {
    /// Run as daemon
    #[structopt(short = "d", long = "daemon")]
    pub daemon: bool,

    /// Listening ports (can be specified multiple times)
    #[structopt(short = "p", long = "port", default_value = "25", number_of_values = 1)]
    pub ports: Vec<u16>,

    /// Listening address
    #[structopt(short = "a", long = "address", default_value = "0.0.0.0")]
    pub address: String,

    /// Host name announced in the greeting
    #[structopt(long = "hostname", default_value = "localhost")]
    pub hostname: String,

    /// Text following the host name in the greeting
    #[structopt(long = "banner", default_value = "smtp-intake ESMTP ready")]
    pub banner: String,

    /// Directory to store received messages in
    #[structopt(long = "data", parse(from_os_str), default_value = "mailbox")]
    pub data_dir: PathBuf,

    /// Log file path (appended to, in addition to the console)
    #[structopt(long = "logs", parse(from_os_str))]
    pub log_file: Option<PathBuf>,

    /// Verbose mode - log the SMTP transcript
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,

    /// TLS certificate chain (PEM), enables STARTTLS together with --tls-key
    #[structopt(long = "tls-cert", parse(from_os_str))]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM, PKCS#8 or RSA)
    #[structopt(long = "tls-key", parse(from_os_str))]
    pub tls_key: Option<PathBuf>,

    /// Maximum connections per minute from the same IP
    #[structopt(long = "max-connections", default_value = "10")]
    pub max_connections_per_minute: usize,

    /// Seconds without client input before the connection is closed
    #[structopt(long = "idle-timeout", default_value = "300")]
    pub idle_timeout: u64,

    /// Longest accepted line in bytes, CRLF excluded
    #[structopt(long = "max-line-length", default_value = "1000")]
    pub max_line_length: usize,

    /// Largest accepted message body in bytes
    #[structopt(long = "max-message-size", default_value = "10485760")]
    pub max_message_size: usize,
}

impl Opt {
    pub fn limits(&self) -> Limits {
        Limits {
            max_line_length: self.max_line_length,
            max_message_size: self.max_message_size,
            idle_timeout: Duration::from_secs(self.idle_timeout),
        }
    }
}
