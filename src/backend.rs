//! # Backend Capability
//!
//! The minimal read/write-by-key contract the store needs from a blob
//! namespace. A remote object-store client plugs in by implementing
//! [`Backend`]; [`MemoryBackend`] and [`FileBackend`] cover tests and
//! single-host deployments.
//!
//! Backends do no retrying, batching or compression of their own.

use crate::error::BackendError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Read/write access to one fixed blob namespace
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Namespace every key is resolved against
    fn namespace(&self) -> &str;

    /// Store `data` under `key`, fully replacing any previous object
    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError>;

    /// Fetch the object under `key`, or [`BackendError::NotFound`]
    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        (**self).write(key, data).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        (**self).read(key).await
    }
}

/// In-process backend keeping objects in a concurrent map
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    namespace: String,
    objects: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            objects: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Raw stored bytes, bypassing the store
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// Overwrite an object directly, bypassing the store
    pub fn put_raw(&self, key: impl Into<String>, data: Vec<u8>) {
        self.objects.insert(key.into(), data);
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.remove(key).map(|(_, data)| data)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        debug!(
            namespace = %self.namespace,
            key = %key,
            bytes = data.len(),
            "Storing object in memory"
        );
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        self.get_raw(key).ok_or_else(|| BackendError::not_found(key))
    }
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Local-disk backend storing each object at `root/namespace/key`.
///
/// Writes land in a temporary sibling first and are renamed into place, so a
/// reader sees either the previous object or the new one. The write and the
/// rename run as one blocking task that completes even if the caller's future
/// is dropped, so no temporary file outlives the write.
#[derive(Debug, Clone)]
pub struct FileBackend {
    namespace: String,
    directory: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl AsRef<Path>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let directory = root.as_ref().join(&namespace);
        Self {
            namespace,
            directory,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        let invalid = key.is_empty()
            || key == "."
            || key == ".."
            || key.starts_with(".tmp-")
            || key.contains(['/', '\\', '\0']);
        if invalid {
            return Err(BackendError::other(key, "key is not a valid object name"));
        }
        Ok(self.directory.join(key))
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        let path = self.object_path(key)?;
        let directory = self.directory.clone();
        let temp_path = self.directory.join(format!(
            ".tmp-{key}-{}-{}",
            std::process::id(),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        let bytes = data.len();

        let target = path.clone();
        let committed = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&directory)?;
            let result = std::fs::write(&temp_path, data)
                .and_then(|()| std::fs::rename(&temp_path, &target));
            if result.is_err() {
                let _ = std::fs::remove_file(&temp_path);
            }
            result
        })
        .await
        .map_err(|e| BackendError::other(key, e.to_string()))?;
        committed.map_err(|e| BackendError::other(key, e.to_string()))?;

        debug!(path = %path.display(), bytes = bytes, "Stored object on disk");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| BackendError::from_io(key, e))
    }
}
