//! # Batch Scheduler
//!
//! Runs one write per account batch on a bounded pool of tokio workers.
//!
//! ## Batch lifecycle
//!
//! ```text
//! Pending ──▶ Writing ──▶ Done
//!                │
//!                ├──▶ Requeued ──▶ Writing ──▶ Done | Failed
//!                └──▶ Failed
//! ```
//!
//! Only retryable errors (see [`IndexError::is_retryable`]) send a batch back
//! to the queue, and only while the [`RetryPolicy`] budget allows. Every batch
//! that ends in `Failed` is reported in the returned [`RunReport`]; one bad
//! account never stops the others.
//!
//! A batch is owned by exactly one worker from `pop` until it is either
//! finished or handed back through [`BatchQueue::requeue`], so two writes for
//! the same account are never in flight together.

use crate::config::RetryPolicy;
use crate::error::{BatchFailure, FlushError, IndexError, Result};
use crate::index::AccountIndexSet;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// One account's pending write
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub account: String,
    pub indexes: AccountIndexSet,
    attempts: u32,
}

impl Batch {
    pub fn new(account: impl Into<String>, indexes: AccountIndexSet) -> Self {
        Self {
            account: account.into(),
            indexes,
            attempts: 0,
        }
    }

    /// Write attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Pending,
    Writing,
    Requeued,
    Done,
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Done | BatchState::Failed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Pending => "pending",
            BatchState::Writing => "writing",
            BatchState::Requeued => "requeued",
            BatchState::Done => "done",
            BatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn trace_transition(batch: &Batch, from: BatchState, to: BatchState) {
    debug!(
        account = %batch.account,
        attempt = batch.attempts,
        from = %from,
        to = %to,
        "Batch state transition"
    );
}

/// Work queue shared by every worker of one scheduler run
#[derive(Debug, Default)]
pub struct BatchQueue {
    inner: Mutex<VecDeque<Batch>>,
}

impl BatchQueue {
    pub fn new(batches: impl IntoIterator<Item = Batch>) -> Self {
        Self {
            inner: Mutex::new(batches.into_iter().collect()),
        }
    }

    pub fn push(&self, batch: Batch) {
        self.inner.lock().push_back(batch);
    }

    pub fn pop(&self) -> Option<Batch> {
        self.inner.lock().pop_front()
    }

    /// Hand a failed batch back for another attempt
    pub fn requeue(&self, batch: Batch) {
        trace_transition(&batch, BatchState::Writing, BatchState::Requeued);
        self.push(batch);
    }

    /// Remove every batch still waiting
    pub fn drain(&self) -> Vec<Batch> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Outcome of one scheduler run
#[derive(Debug)]
pub struct RunReport {
    pub submitted: usize,
    pub written: usize,
    pub retries: u64,
    pub failures: Vec<BatchFailure>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> std::result::Result<(), FlushError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(FlushError {
                failures: self.failures,
            })
        }
    }
}

#[derive(Debug, Default)]
struct RunState {
    failures: Mutex<Vec<BatchFailure>>,
    written: AtomicUsize,
    retries: AtomicU64,
}

impl RunState {
    fn fail(&self, mut batch: Batch, from: BatchState, error: IndexError) {
        trace_transition(&batch, from, BatchState::Failed);
        warn!(
            account = %batch.account,
            attempts = batch.attempts,
            error = %error,
            "Batch failed"
        );
        self.failures.lock().push(BatchFailure {
            account: std::mem::take(&mut batch.account),
            attempts: batch.attempts,
            error,
        });
    }
}

/// Bounded-concurrency executor for account batches
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    parallelism: usize,
    retry: RetryPolicy,
}

impl BatchScheduler {
    pub fn new(parallelism: usize, retry: RetryPolicy) -> Self {
        if parallelism == 0 {
            warn!("Scheduler parallelism of 0 requested, using 1");
        }
        Self {
            parallelism: parallelism.max(1),
            retry,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Write every batch and wait until each one is `Done` or `Failed`
    pub async fn run<F, Fut>(&self, batches: Vec<Batch>, write_one: F) -> RunReport
    where
        F: Fn(&Batch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.run_with_cancel(batches, write_one, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires.
    ///
    /// Queued batches are not started after cancellation and in-flight writes
    /// are abandoned; all of them are reported as [`IndexError::Cancelled`].
    #[instrument(skip_all, fields(batches = batches.len(), parallelism = self.parallelism))]
    pub async fn run_with_cancel<F, Fut>(
        &self,
        batches: Vec<Batch>,
        write_one: F,
        cancel: CancellationToken,
    ) -> RunReport
    where
        F: Fn(&Batch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let started = Instant::now();
        let submitted = batches.len();
        let queue = Arc::new(BatchQueue::new(batches));
        let state = Arc::new(RunState::default());
        let write_one = Arc::new(write_one);

        let worker_count = self.parallelism.min(submitted);
        debug!(submitted, worker_count, "Starting batch workers");

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let state = state.clone();
            let write_one = write_one.clone();
            let cancel = cancel.clone();
            let retry = self.retry.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, state, write_one, cancel, retry).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Batch worker terminated abnormally");
            }
        }

        for batch in queue.drain() {
            let account = batch.account.clone();
            state.fail(batch, BatchState::Pending, IndexError::cancelled(account));
        }

        let report = RunReport {
            submitted,
            written: state.written.load(Ordering::Acquire),
            retries: state.retries.load(Ordering::Acquire),
            failures: std::mem::take(&mut *state.failures.lock()),
            duration: started.elapsed(),
        };

        info!(
            submitted = report.submitted,
            written = report.written,
            failed = report.failures.len(),
            retries = report.retries,
            duration_ms = report.duration.as_millis(),
            "Batch run completed"
        );

        report
    }
}

async fn worker_loop<F, Fut>(
    worker_id: usize,
    queue: Arc<BatchQueue>,
    state: Arc<RunState>,
    write_one: Arc<F>,
    cancel: CancellationToken,
    retry: RetryPolicy,
) where
    F: Fn(&Batch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    while !cancel.is_cancelled() {
        let Some(mut batch) = queue.pop() else {
            break;
        };

        let from = if batch.attempts == 0 {
            BatchState::Pending
        } else {
            BatchState::Requeued
        };
        batch.attempts += 1;
        trace_transition(&batch, from, BatchState::Writing);

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| write_one(&batch))) {
            Ok(write) => {
                // A write that is already complete wins over a concurrent cancel
                tokio::select! {
                    biased;
                    result = AssertUnwindSafe(write).catch_unwind() => {
                        result.unwrap_or_else(|_| Err(IndexError::worker_panic(&batch.account)))
                    }
                    _ = cancel.cancelled() => Err(IndexError::cancelled(&batch.account)),
                }
            }
            Err(_) => Err(IndexError::worker_panic(&batch.account)),
        };

        match outcome {
            Ok(()) => {
                trace_transition(&batch, BatchState::Writing, BatchState::Done);
                state.written.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) if err.is_retryable() && batch.attempts < retry.max_attempts() => {
                let delay = retry.delay_for(batch.attempts);
                warn!(
                    worker_id,
                    account = %batch.account,
                    attempt = batch.attempts,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Batch write failed, requeueing"
                );

                let cancelled = !delay.is_zero()
                    && tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                if cancelled {
                    let account = batch.account.clone();
                    state.fail(batch, BatchState::Writing, IndexError::cancelled(account));
                    continue;
                }

                state.retries.fetch_add(1, Ordering::AcqRel);
                queue.requeue(batch);
            }
            Err(err) => state.fail(batch, BatchState::Writing, err),
        }
    }

    debug!(worker_id, "Batch worker finished");
}
