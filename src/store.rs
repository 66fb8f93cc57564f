//! Message persistence.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid message id {0:?}")]
    InvalidId(String),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives finished message bodies.
///
/// Implementations must accept concurrent appends for distinct ids.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn append(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Stores each message as `<dir>/<id>.eml`.
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.eml", id)))
    }
}

#[async_trait]
impl MessageSink for DirSink {
    async fn append(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(bytes).await?;
            file.flush().await
        };
        write.await.map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })
    }
}
