//! `SQLite`-backed seen-set store.
//!
//! One store per logical crawl target: a durable key → value file recording
//! which dedup keys have already been processed. Every mutation is committed
//! immediately; there is no batching and no transaction boundary exposed to
//! the caller.

use crate::models::SeenValue;
use crate::storage::sqlite::{acquire_lock, configure_connection, record_operation_metrics};
use crate::storage::traits::SeenBackend;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-backed seen-set store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access, serializing all reads
/// and writes (the store is a shared resource with single-writer discipline;
/// request volume is network-bound, not storage-bound). `SQLite`'s WAL mode
/// and `busy_timeout` pragma handle contention with external readers.
///
/// # Durability
///
/// The connection runs with `synchronous=FULL`: once `mark_seen` returns, the
/// record survives an immediate crash-restart. Concurrent opens of the same
/// path from multiple processes are out of scope (single-writer assumption).
///
/// # Schema
///
/// A single `seen` table: `key TEXT PRIMARY KEY`, `value` (native scalar,
/// stored verbatim), `stored_at INTEGER` (when the record was last written,
/// kept for administrative inspection of the file).
pub struct SeenStore {
    /// Connection to the `SQLite` database.
    ///
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the backing file (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SeenStore {
    /// Opens or creates a seen-set store at `path`.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the path is not writable or the backing
    /// file cannot be opened or initialized.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Storage {
                    operation: "create_store_dir".to_string(),
                    cause: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::Storage {
            operation: "open_store".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory seen-set store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage {
            operation: "open_store_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the backing file path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        configure_connection(&conn);

        // The key column doubles as the primary-key index, giving amortized
        // O(1) point lookups
        conn.execute(
            "CREATE TABLE IF NOT EXISTS seen (
                key TEXT PRIMARY KEY,
                value NOT NULL,
                stored_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::Storage {
            operation: "create_seen_table".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Returns the stored value for a key, if any.
    ///
    /// Not part of the dedup decision path; exposed for administrative
    /// inspection and tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the lookup fails.
    #[instrument(skip(self), fields(operation = "get"))]
    pub fn get(&self, key: &str) -> Result<Option<SeenValue>> {
        let conn = acquire_lock(&self.conn);

        conn.query_row("SELECT value FROM seen WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| Error::Storage {
            operation: "get_value".to_string(),
            cause: e.to_string(),
        })
    }

    /// Flushes and releases the underlying resource.
    ///
    /// Consumes the store, so no further operations are possible afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the final flush fails.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        conn.close().map_err(|(_, e)| Error::Storage {
            operation: "close_store".to_string(),
            cause: e.to_string(),
        })
    }
}

impl SeenBackend for SeenStore {
    #[instrument(skip(self, value), fields(operation = "mark_seen"))]
    fn mark_seen(&self, key: &str, value: &SeenValue) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            // Single-statement upsert: atomic and committed before returning,
            // last-write-wins on an existing key
            #[allow(clippy::cast_possible_wrap)]
            let stored_at = crate::current_timestamp() as i64;
            conn.execute(
                "INSERT OR REPLACE INTO seen (key, value, stored_at) VALUES (?1, ?2, ?3)",
                params![key, value, stored_at],
            )
            .map_err(|e| Error::Storage {
                operation: "mark_seen".to_string(),
                cause: e.to_string(),
            })?;

            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("mark_seen", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "is_seen"))]
    fn is_seen(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let seen: bool = conn
                .query_row("SELECT 1 FROM seen WHERE key = ?1", params![key], |_| {
                    Ok(true)
                })
                .optional()
                .map_err(|e| Error::Storage {
                    operation: "is_seen".to_string(),
                    cause: e.to_string(),
                })?
                .unwrap_or(false);

            Ok(seen)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("is_seen", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "unsee"))]
    fn unsee(&self, key: &str) -> Result<bool> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let deleted = conn
                .execute("DELETE FROM seen WHERE key = ?1", params![key])
                .map_err(|e| Error::Storage {
                    operation: "unsee".to_string(),
                    cause: e.to_string(),
                })?;

            Ok(deleted > 0)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("unsee", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "count"))]
    fn count(&self) -> Result<usize> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))
                .map_err(|e| Error::Storage {
                    operation: "count".to_string(),
                    cause: e.to_string(),
                })?;

            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Ok(count as usize)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("count", start, status);
        result
    }
}
