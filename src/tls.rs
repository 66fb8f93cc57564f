//! Server-side TLS configuration used for STARTTLS.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("failed to build TLS config: {0}")]
    Config(#[from] rustls::Error),
}

/// Process-wide STARTTLS capability. Built once, shared by every connection.
#[derive(Clone)]
pub struct TlsUpgrade {
    acceptor: TlsAcceptor,
}

impl TlsUpgrade {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
        }
    }

    /// Builds the capability from DER encoded certificate chain and key.
    pub fn from_der(cert_chain: Vec<Vec<u8>>, key: Vec<u8>) -> Result<Self, TlsError> {
        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(
                cert_chain.into_iter().map(Certificate).collect(),
                PrivateKey(key),
            )?;
        Ok(Self::new(Arc::new(config)))
    }

    /// Loads a PEM certificate chain and a PKCS#8 or RSA private key.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert_chain = certs(&mut open(cert_path)?).map_err(|source| TlsError::Read {
            path: cert_path.display().to_string(),
            source,
        })?;
        if cert_chain.is_empty() {
            return Err(TlsError::NoCertificate(cert_path.display().to_string()));
        }

        let read_err = |source| TlsError::Read {
            path: key_path.display().to_string(),
            source,
        };
        let mut keys = pkcs8_private_keys(&mut open(key_path)?).map_err(read_err)?;
        if keys.is_empty() {
            keys = rsa_private_keys(&mut open(key_path)?).map_err(read_err)?;
        }
        if keys.is_empty() {
            return Err(TlsError::NoPrivateKey(key_path.display().to_string()));
        }

        Self::from_der(cert_chain, keys.remove(0))
    }

    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })
}
