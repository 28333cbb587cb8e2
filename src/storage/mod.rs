//! Storage layer for the persistent seen-set.
//!
//! One [`SeenStore`] per logical crawl target: a durable key → value record
//! backed by `SQLite`, opened at a per-target file path. The store commits
//! every write immediately; dedup correctness after a crash requires that a
//! "seen" mark survive the crash that might occur right after the response
//! was processed but before the crawl process exits cleanly.

// Allow significant_drop_tightening - dropping database connections slightly
// early provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

mod seen;
mod sqlite;
mod traits;

pub use seen::SeenStore;
pub use sqlite::{acquire_lock, configure_connection, record_operation_metrics};
pub use traits::SeenBackend;
