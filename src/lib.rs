//! # crawl-once
//!
//! Persistent request deduplication for web crawlers.
//!
//! crawl-once remembers which requests have already been processed, so that
//! re-running a crawl skips previously-fetched content while still letting
//! fresh items through. The crate has two layers:
//!
//! - [`SeenStore`]: a durable, crash-safe fingerprint → value record backed
//!   by `SQLite`, one file per crawl target
//! - [`DedupGate`]: the decision logic consulted before a request is
//!   dispatched and updated after its response is produced
//!
//! The crawling engine itself (scheduling, fetching, link extraction) and the
//! fingerprinting algorithm are external collaborators: the gate consumes a
//! precomputed deterministic fingerprint plus an optional per-request
//! override bag.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crawl_once::{CrawlOnceConfig, CrawlRequest, CrawlResponse, Decision, DedupGate};
//!
//! let mut gate = DedupGate::new(CrawlOnceConfig::default());
//! gate.open_target("products-spider")?;
//!
//! let req = CrawlRequest::new("fp:GET:https://example.org/1").with_dedup(true);
//! match gate.before_dispatch(&req)? {
//!     Decision::Proceed => { /* fetch, then: */ }
//!     Decision::Suppress => { /* already crawled, skip */ }
//! }
//! gate.after_response(&CrawlResponse::default(), &req)?;
//! gate.close_target()?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod gate;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use config::CrawlOnceConfig;
pub use gate::{CounterSnapshot, Decision, DedupGate};
pub use models::{CrawlRequest, CrawlResponse, DedupOverrides, SeenValue};
pub use storage::{SeenBackend, SeenStore};

/// Error type for crawl-once operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Storage` | Seen-set file cannot be opened, created, or written |
/// | `InvalidUsage` | Gate methods called out of lifecycle order |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A storage operation failed.
    ///
    /// Raised when:
    /// - The seen-set database cannot be opened or created (permissions,
    ///   missing parent, disk full)
    /// - A durable write or point lookup fails
    /// - The backing file is corrupt beyond recovery
    ///
    /// Fatal for the affected target: the gate cannot provide dedup
    /// correctness without its store, so callers must surface this as a hard
    /// error rather than silently continuing. Storage failures are never
    /// retried internally.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Gate methods were called out of lifecycle order.
    ///
    /// Raised when:
    /// - A dedup decision is requested before `open_target`
    /// - Any gate operation is attempted after `close_target`
    /// - A target is opened or closed twice
    ///
    /// This is a programming error in the host pipeline, propagated
    /// immediately with no recovery attempt.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
}

/// Result type alias for crawl-once operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// This is the default value recorded for a key when the response carries no
/// explicit value override. Uses `SystemTime::now()` with fallback to 0 if
/// the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use crawl_once::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Storage {
            operation: "open_store".to_string(),
            cause: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage operation 'open_store' failed: permission denied"
        );

        let err = Error::InvalidUsage("target not opened".to_string());
        assert_eq!(err.to_string(), "invalid usage: target not opened");
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2020-01-01 as a sanity floor
        assert!(current_timestamp() > 1_577_836_800);
    }
}
