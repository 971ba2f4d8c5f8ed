use async_trait::async_trait;
use checkpoint_index::{Backend, BackendError, MemoryBackend};
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory backend that fails writes on demand
#[derive(Debug, Clone)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    /// Remaining injected failures per key
    transient: Arc<DashMap<String, u32>>,
    /// Keys whose writes always fail
    broken: Arc<DashSet<String>>,
    /// Write attempts seen per key
    attempts: Arc<DashMap<String, u32>>,
}

impl FlakyBackend {
    pub fn new(namespace: &str) -> Self {
        Self {
            inner: MemoryBackend::new(namespace),
            transient: Arc::new(DashMap::new()),
            broken: Arc::new(DashSet::new()),
            attempts: Arc::new(DashMap::new()),
        }
    }

    pub fn fail_times(&self, key: &str, times: u32) {
        self.transient.insert(key.to_string(), times);
    }

    pub fn fail_always(&self, key: &str) {
        self.broken.insert(key.to_string());
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        *self.attempts.entry(key.to_string()).or_insert(0) += 1;

        if self.broken.contains(key) {
            return Err(BackendError::other(key, "injected permanent failure"));
        }
        if let Some(mut remaining) = self.transient.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::other(key, "injected transient failure"));
            }
        }
        self.inner.write(key, data).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        self.inner.read(key).await
    }
}

/// Memory backend that records how many writes overlap
#[derive(Debug, Clone)]
pub struct InstrumentedBackend {
    pub inner: MemoryBackend,
    write_delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    active_keys: Arc<DashSet<String>>,
    overlapping_keys: Arc<DashSet<String>>,
}

impl InstrumentedBackend {
    pub fn new(namespace: &str, write_delay: Duration) -> Self {
        Self {
            inner: MemoryBackend::new(namespace),
            write_delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            active_keys: Arc::new(DashSet::new()),
            overlapping_keys: Arc::new(DashSet::new()),
        }
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn overlapping_keys(&self) -> usize {
        self.overlapping_keys.len()
    }
}

#[async_trait]
impl Backend for InstrumentedBackend {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        if !self.active_keys.insert(key.to_string()) {
            self.overlapping_keys.insert(key.to_string());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.write_delay).await;
        let result = self.inner.write(key, data).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.active_keys.remove(key);
        result
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        self.inner.read(key).await
    }
}

/// Backend whose writes never complete
#[derive(Debug, Clone)]
pub struct StalledBackend {
    pub inner: MemoryBackend,
}

impl StalledBackend {
    pub fn new(namespace: &str) -> Self {
        Self {
            inner: MemoryBackend::new(namespace),
        }
    }
}

#[async_trait]
impl Backend for StalledBackend {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn write(&self, _key: &str, _data: Vec<u8>) -> Result<(), BackendError> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        self.inner.read(key).await
    }
}

/// Memory backend whose reads fail with a non-missing error
#[derive(Debug, Clone)]
pub struct UnreadableBackend {
    pub inner: MemoryBackend,
}

impl UnreadableBackend {
    pub fn new(namespace: &str) -> Self {
        Self {
            inner: MemoryBackend::new(namespace),
        }
    }
}

#[async_trait]
impl Backend for UnreadableBackend {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<(), BackendError> {
        self.inner.write(key, data).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::other(key, "connection reset"))
    }
}
