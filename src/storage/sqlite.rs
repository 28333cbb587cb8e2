//! Shared `SQLite` connection handling for the seen-set store.
//!
//! Provides mutex handling with poison recovery, connection configuration,
//! and metrics recording for store operations.

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Helper to acquire the connection mutex with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. The connection state is
/// still valid; only the panicking operation was lost.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("seen-store mutex was poisoned, recovering");
            metrics::counter!("seen_store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for a crash-safe seen-set.
///
/// # Configuration Applied
///
/// - **WAL mode**: Write-Ahead Logging for better concurrent read performance
/// - **FULL synchronous**: every committed upsert must survive an immediate
///   crash-restart; the write throughput cost is acceptable because request
///   volume is bounded by network I/O, not storage
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention instead of
///   failing immediately
///
/// # Concurrency Model
///
/// The store wraps its connection in a `Mutex`, serializing all reads and
/// writes (single-writer discipline). WAL mode and `busy_timeout` keep an
/// external reader (e.g. an operator inspecting the file) from tripping
/// `SQLITE_BUSY` errors.
pub fn configure_connection(conn: &Connection) {
    // journal_mode returns a string result, which execute_batch would treat
    // as an error; pragma_update handles it
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "FULL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Records operation metrics for seen-store operations.
///
/// Records two metrics per operation:
/// 1. `seen_store_operations_total` - counter by operation and status
/// 2. `seen_store_operation_duration_ms` - latency histogram
///
/// # Examples
///
/// ```ignore
/// use std::time::Instant;
/// use crawl_once::storage::record_operation_metrics;
///
/// let start = Instant::now();
/// // ... perform operation ...
/// let status = if result.is_ok() { "success" } else { "error" };
/// record_operation_metrics("mark_seen", start, status);
/// ```
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "seen_store_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "seen_store_operation_duration_ms",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
