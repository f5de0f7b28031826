//! Payload storage for uploaded print documents.
//!
//! - On-disk storage for a single-host spooler
//! - In-memory storage for tests
//!
//! A thin wrapper around `object_store`. [`StoragePayloadStore`] adapts it to
//! the worker's blocking [`PayloadStore`] capability.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use spooler::{PayloadError, PayloadStore};
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

const DEFAULT_FS_ROOT: &str = "./data/payloads";

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `PAYLOAD_BACKEND`: `filesystem` (default) or `memory`
    /// - `PAYLOAD_FS_ROOT` (default: `./data/payloads`)
    /// - `PAYLOAD_PREFIX` (optional, e.g. `spool/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("PAYLOAD_BACKEND").ok().and_then(non_empty);
        let prefix = std::env::var("PAYLOAD_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("filesystem") | Some("fs") | None => {
                let root = std::env::var("PAYLOAD_FS_ROOT")
                    .ok()
                    .and_then(non_empty)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FS_ROOT));
                Self::filesystem(root)
            }
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported PAYLOAD_BACKEND={other} (expected filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Where an uploaded document ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPayload {
    /// Key to hand to [`spooler::Job::with_payload_ref`].
    pub key: String,
    pub file_name: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg.backend {
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey(
                "object key must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Path::parse(&joined).map_err(|e| StorageError::InvalidKey(format!("{joined}: {e}")))
    }

    /// Store an uploaded document under a fresh `<ulid>/<file name>` key.
    ///
    /// Two uploads with the same file name never collide.
    pub async fn store_document(
        &self,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<StoredPayload, StorageError> {
        let file_name = sanitize_file_name(file_name)?;
        let key = format!("{}/{}", Ulid::new(), file_name);
        let size = bytes.len() as u64;
        self.put_bytes(&key, bytes).await?;
        tracing::debug!(key = %key, size, "stored payload");

        Ok(StoredPayload {
            key,
            file_name,
            size,
            stored_at: Utc::now(),
        })
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.to_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }
}

/// Releases payloads by deleting them from [`Storage`].
///
/// The worker calls [`PayloadStore::release`] from its own OS thread, so
/// the async delete is driven to completion on a runtime handle captured at
/// construction. Must not be called from inside that runtime's async tasks.
pub struct StoragePayloadStore {
    storage: Storage,
    runtime: tokio::runtime::Handle,
}

impl StoragePayloadStore {
    pub fn new(storage: Storage, runtime: tokio::runtime::Handle) -> Self {
        Self { storage, runtime }
    }

    /// Capture the handle of the runtime this is called from.
    pub fn from_current(storage: Storage) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StorageError::InvalidConfig(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(storage, runtime))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl PayloadStore for StoragePayloadStore {
    fn release(&self, payload_ref: &str) -> Result<(), PayloadError> {
        match self.runtime.block_on(self.storage.delete(payload_ref)) {
            Ok(()) => Ok(()),
            Err(StorageError::ObjectStore(object_store::Error::NotFound { .. })) => {
                Err(PayloadError::NotFound(payload_ref.to_string()))
            }
            Err(e) => Err(PayloadError::Backend(e.to_string())),
        }
    }
}

fn sanitize_file_name(file_name: &str) -> Result<String, StorageError> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(StorageError::InvalidKey(format!(
            "unusable file name {file_name:?}"
        )));
    }
    Ok(base.to_string())
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
