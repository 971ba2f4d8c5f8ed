//! # Structured Logging Module
//!
//! Environment-aware structured logging for flush and read operations.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging.
///
/// The filter comes from `INDEX_STORE_LOG`, then `RUST_LOG`, falling back to
/// `info`. Setting `INDEX_STORE_LOG_FORMAT=json` switches to JSON records.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = get_log_filter();
        let json = std::env::var("INDEX_STORE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(filter.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(filter.clone()))
                .boxed()
        };

        // Embedders may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
        }

        tracing::info!(filter = %filter, json = json, "Structured logging initialized");
    });
}

fn get_log_filter() -> String {
    resolve_log_filter(
        std::env::var("INDEX_STORE_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
    )
}

fn resolve_log_filter(index_store_log: Option<String>, rust_log: Option<String>) -> String {
    index_store_log
        .or(rust_log)
        .unwrap_or_else(|| "info".to_string())
}

/// Log the outcome of one flush call
pub fn log_flush_summary(
    namespace: &str,
    submitted: usize,
    failed: usize,
    retries: u64,
    duration_ms: u128,
) {
    tracing::info!(
        operation = "flush",
        namespace = %namespace,
        submitted = submitted,
        written = submitted.saturating_sub(failed),
        failed = failed,
        retries = retries,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "FLUSH_COMPLETED"
    );
}

/// Log a single index read
pub fn log_read_operation(namespace: &str, account: &str, status: &str, details: Option<&str>) {
    tracing::debug!(
        operation = "read",
        namespace = %namespace,
        account = %account,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "READ_OPERATION"
    );
}
