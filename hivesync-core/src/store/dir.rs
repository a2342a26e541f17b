//! Directory-backed store: each replica is a sub-directory of `root`.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   replica-0/<sha256(location \0 content)>.entry
//!   replica-1/...
//! ```
//!
//! Writes use a `.tmp` sibling + rename so a reader never observes a torn
//! value.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AsyncStore, GetResponse};
use crate::error::{io_err, StoreError};
use crate::types::{ReplicaId, StoreKey};

/// A store whose replicas live in local directories (for example a folder
/// shared between machines).
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    replicas: Vec<ReplicaId>,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>, replicas: usize) -> Self {
        Self {
            root: root.into(),
            replicas: (0..replicas.max(1))
                .map(|i| ReplicaId(format!("replica-{i}")))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<replica>/<digest>.entry` — pure, no I/O.
    pub fn entry_path(&self, replica: &ReplicaId, key: &StoreKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.location.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.content.0.as_bytes());
        self.root
            .join(&replica.0)
            .join(format!("{}.entry", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl AsyncStore for DirStore {
    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        for replica in &self.replicas {
            let path = self.entry_path(replica, key);
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| io_err(dir, e))?;
            }
            let tmp = path.with_extension("entry.tmp");
            tokio::fs::write(&tmp, &value)
                .await
                .map_err(|e| io_err(&tmp, e))?;
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(io_err(&path, e));
            }
        }
        tracing::debug!(key = %key, replicas = self.replicas.len(), "dir store put");
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> Result<GetResponse, StoreError> {
        let mut response = GetResponse::default();
        for replica in &self.replicas {
            let path = self.entry_path(replica, key);
            let value = match tokio::fs::read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == ErrorKind::NotFound => None,
                Err(err) => return Err(io_err(&path, err)),
            };
            response.entries.insert(replica.clone(), value);
        }
        Ok(response)
    }

    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
        for replica in &self.replicas {
            let path = self.entry_path(replica, key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(io_err(&path, err)),
            }
        }
        tracing::debug!(key = %key, "dir store remove");
        Ok(())
    }
}
