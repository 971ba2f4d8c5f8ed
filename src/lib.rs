#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Checkpoint Index Store
//!
//! Persists compact per-account checkpoint indexes to a blob backend and
//! reads them back on demand.
//!
//! ## Overview
//!
//! Callers accumulate dirty state as a [`FlushRequest`] (account identifier
//! to index-category name to [`CheckpointIndex`]) and hand it to
//! [`IndexStore::flush`]. Every account becomes one batch: its index set is
//! serialized, gzip-compressed and written to the [`Backend`] under the
//! account identifier, with up to `parallelism` writes in flight. Failed
//! writes are retried within a bounded budget; accounts that still fail are
//! reported together in [`IndexError::Flush`] without affecting the rest.
//!
//! [`IndexStore::read`] fetches and decodes one account's set, returning
//! [`IndexError::NotFound`] when no object exists yet.
//!
//! ## Module Organization
//!
//! - [`index`] - Checkpoint bitmap and the index set type aliases
//! - [`serializer`] - Compressed encoding of an account's index set
//! - [`backend`] - Read/write contract plus memory and local-disk backends
//! - [`scheduler`] - Bounded worker pool with a requeueing batch queue
//! - [`store`] - The `flush`/`read` entry point
//! - [`config`] - Store configuration and retry policy
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup

pub mod backend;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod scheduler;
pub mod serializer;
pub mod store;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use config::{RetryPolicy, StoreConfig, DEFAULT_NAMESPACE};
pub use error::{BackendError, BatchFailure, FlushError, IndexError, Result};
pub use index::{AccountIndexSet, CheckpointIndex, FlushRequest};
pub use scheduler::{Batch, BatchQueue, BatchScheduler, BatchState, RunReport};
pub use store::IndexStore;
pub use tokio_util::sync::CancellationToken;
