//! # Index Store
//!
//! Persists each account's [`AccountIndexSet`] as one compressed object keyed
//! by the account identifier, and reads it back on demand.
//!
//! ```rust,no_run
//! use checkpoint_index::{CheckpointIndex, FlushRequest, IndexStore, MemoryBackend};
//!
//! # async fn example() -> checkpoint_index::Result<()> {
//! let store = IndexStore::new(MemoryBackend::new("horizon-index"), 4);
//!
//! let mut request = FlushRequest::new();
//! request
//!     .entry("GABC".to_string())
//!     .or_default()
//!     .insert("asset".to_string(), CheckpointIndex::with_checkpoints([1, 2])?);
//! store.flush(request).await?;
//!
//! let indexes = store.read("GABC").await?;
//! assert!(indexes["asset"].is_active(2));
//! # Ok(())
//! # }
//! ```

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{IndexError, Result};
use crate::index::{AccountIndexSet, FlushRequest};
use crate::logging;
use crate::scheduler::{Batch, BatchScheduler};
use crate::serializer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct IndexStore {
    backend: Arc<dyn Backend>,
    config: StoreConfig,
    scheduler: BatchScheduler,
}

impl IndexStore {
    /// Create a store writing through `backend` with the given parallelism
    /// and the default retry policy
    pub fn new(backend: impl Backend + 'static, parallelism: usize) -> Self {
        let config = StoreConfig {
            namespace: backend.namespace().to_string(),
            ..StoreConfig::with_parallelism(parallelism)
        };
        Self::from_parts(Arc::new(backend), config)
    }

    /// Create a store from an explicit configuration.
    ///
    /// The backend must serve the namespace named in `config`.
    pub fn with_config(backend: impl Backend + 'static, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        if backend.namespace() != config.namespace {
            return Err(IndexError::configuration(format!(
                "backend namespace {:?} does not match configured namespace {:?}",
                backend.namespace(),
                config.namespace
            )));
        }
        Ok(Self::from_parts(Arc::new(backend), config))
    }

    fn from_parts(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        let scheduler = BatchScheduler::new(config.parallelism, config.retry.clone());
        Self {
            backend,
            config,
            scheduler,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Persist every account in `request`, one object per account.
    ///
    /// Each object is replaced wholesale by the submitted set. Accounts that
    /// could not be written are listed in the returned
    /// [`IndexError::Flush`]; everything else was committed.
    pub async fn flush(&self, request: FlushRequest) -> Result<()> {
        self.flush_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`flush`](Self::flush), abandoning outstanding work once `cancel`
    /// fires. Abandoned accounts are reported as [`IndexError::Cancelled`].
    #[instrument(skip_all, fields(namespace = %self.config.namespace, accounts = request.len()))]
    pub async fn flush_with_cancel(
        &self,
        request: FlushRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        if request.is_empty() {
            debug!("Nothing to flush");
            return Ok(());
        }

        let batches: Vec<Batch> = request
            .into_iter()
            .map(|(account, indexes)| Batch::new(account, indexes))
            .collect();

        let backend = self.backend.clone();
        let report = self
            .scheduler
            .run_with_cancel(
                batches,
                move |batch| {
                    let backend = backend.clone();
                    let account = batch.account.clone();
                    let encoded = serializer::encode(&batch.indexes);
                    async move {
                        let data = encoded?;
                        debug!(account = %account, bytes = data.len(), "Writing account index");
                        backend
                            .write(&account, data)
                            .await
                            .map_err(|e| IndexError::backend_write(account, e))
                    }
                },
                cancel,
            )
            .await;

        logging::log_flush_summary(
            &self.config.namespace,
            report.submitted,
            report.failures.len(),
            report.retries,
            report.duration.as_millis(),
        );

        report.into_result().map_err(IndexError::from)
    }

    /// Load the index set stored for `account`.
    ///
    /// Returns [`IndexError::NotFound`] when nothing has been stored for the
    /// account yet; a stored object that fails to decode is an
    /// [`IndexError::Serialization`] error, never "not found".
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn read(&self, account: &str) -> Result<AccountIndexSet> {
        let data = match self.backend.read(account).await {
            Ok(data) => data,
            Err(e) => {
                let err = IndexError::backend_read(account, e);
                let status = if err.is_not_found() { "not_found" } else { "error" };
                logging::log_read_operation(&self.config.namespace, account, status, None);
                return Err(err);
            }
        };

        match serializer::decode(&data) {
            Ok(indexes) => {
                logging::log_read_operation(&self.config.namespace, account, "ok", None);
                Ok(indexes)
            }
            Err(e) => {
                warn!(
                    account = %account,
                    bytes = data.len(),
                    error = %e,
                    "Stored index is corrupt"
                );
                logging::log_read_operation(
                    &self.config.namespace,
                    account,
                    "corrupt",
                    Some(&e.to_string()),
                );
                Err(e)
            }
        }
    }
}
