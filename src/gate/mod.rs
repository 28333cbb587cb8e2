//! Dedup decision gate.
//!
//! [`DedupGate`] sits at two points of the host crawler's pipeline: it is
//! consulted before a request is dispatched (suppressing requests whose key
//! is already in the seen-set) and updated after a response has been fully
//! produced (recording the key durably). The gate exclusively owns one
//! [`SeenStore`] per active crawl target, acquired and released via explicit
//! `open_target`/`close_target` calls at the host's lifecycle points.

use crate::config::CrawlOnceConfig;
use crate::models::{CrawlRequest, CrawlResponse, SeenValue};
use crate::storage::{SeenBackend, SeenStore};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// File extension for per-target seen-set databases.
pub const STORE_FILE_EXTENSION: &str = "db";

/// Outcome of a pre-dispatch dedup check.
///
/// `Suppress` is a control-flow signal, not an error: the caller's pipeline
/// must treat it as "intentionally skip this request", distinguishable from
/// genuine failures so it is neither logged as a crawl failure nor retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is fresh (or dedup is not requested); dispatch it.
    Proceed,
    /// The request's key is already in the seen-set; do not dispatch.
    Suppress,
}

impl Decision {
    /// Returns `true` for [`Decision::Suppress`].
    #[must_use]
    pub const fn is_suppress(self) -> bool {
        matches!(self, Self::Suppress)
    }
}

/// Read-only snapshot of the gate's counters.
///
/// Queryable by the surrounding system after each gate call, for monitoring
/// and testing. Counters reset per process run; they are not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Records present in the store at open time.
    pub initial: u64,
    /// Records added this run.
    pub stored: u64,
    /// Requests suppressed this run.
    pub ignored: u64,
}

/// In-memory counters, atomic so `&self` decision methods can update them.
#[derive(Debug, Default)]
struct DedupCounters {
    initial: AtomicU64,
    stored: AtomicU64,
    ignored: AtomicU64,
}

/// Lifecycle state of the gate's active target.
enum TargetState {
    /// No target opened yet; decisions are invalid.
    NotOpened,
    /// Target open. `store` is `None` when the whole mechanism is disabled
    /// by configuration, in which case every decision is a pass-through.
    Open { store: Option<SeenStore> },
    /// Target closed; all further gate operations are invalid.
    Closed,
}

/// Request-deduplication gate.
///
/// # Lifecycle
///
/// `open_target` must be called exactly once before any decision, and
/// `close_target` exactly once after all decisions for the target are
/// finished. Calls outside that window are [`Error::InvalidUsage`]. The
/// lifecycle methods take `&mut self`; the decision methods take `&self`
/// (store serialized internally, counters atomic), so between the lifecycle
/// points the gate can be shared across worker tasks behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use crawl_once::{CrawlOnceConfig, CrawlRequest, Decision, DedupGate};
///
/// let mut gate = DedupGate::new(CrawlOnceConfig::default().with_default_enabled(true));
/// gate.open_target("products-spider")?;
///
/// let req = CrawlRequest::new("fp:GET:https://example.org/1");
/// if gate.before_dispatch(&req)? == Decision::Proceed {
///     // dispatch, and once the response is fully produced:
///     gate.after_response(&response, &req)?;
/// }
/// gate.close_target()?;
/// ```
pub struct DedupGate {
    config: CrawlOnceConfig,
    state: TargetState,
    counters: DedupCounters,
}

impl DedupGate {
    /// Creates a gate with the given configuration.
    ///
    /// Construction does not touch storage; the store is opened by
    /// [`open_target`](Self::open_target).
    #[must_use]
    pub fn new(config: CrawlOnceConfig) -> Self {
        Self {
            config,
            state: TargetState::NotOpened,
            counters: DedupCounters::default(),
        }
    }

    /// Resolves the storage path for a target name.
    ///
    /// One file per target under the configured base directory, with the
    /// sanitized target name as the filename stem.
    #[must_use]
    pub fn store_path(&self, target: &str) -> PathBuf {
        self.config
            .base_dir
            .join(format!("{}.{STORE_FILE_EXTENSION}", sanitize_target(target)))
    }

    /// Opens the seen-set store for a crawl target.
    ///
    /// Records the store's current record count as the `initial` counter.
    /// Must be called exactly once, before any decision. When the whole
    /// mechanism is disabled by configuration, no file is touched and every
    /// subsequent decision is a pass-through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] if a target was already opened, or
    /// [`Error::Storage`] if the store cannot be opened.
    pub fn open_target(&mut self, target: &str) -> Result<()> {
        if !matches!(self.state, TargetState::NotOpened) {
            return Err(Error::InvalidUsage(format!(
                "open_target('{target}') called on a gate that already opened a target"
            )));
        }

        if !self.config.enabled {
            info!(name = target, "dedup mechanism disabled, opening pass-through gate");
            self.state = TargetState::Open { store: None };
            return Ok(());
        }

        let path = self.store_path(target);
        let store = SeenStore::open(&path)?;
        let initial = u64::try_from(store.count()?).unwrap_or(u64::MAX);
        self.counters.initial.store(initial, Ordering::Relaxed);

        info!(
            name = target,
            path = %path.display(),
            records = initial,
            "opened seen-set database"
        );

        self.state = TargetState::Open { store: Some(store) };
        Ok(())
    }

    /// Closes the seen-set store.
    ///
    /// Must be called exactly once, after all decisions for the target are
    /// finished. No further gate operations are valid afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] if no target is open, or
    /// [`Error::Storage`] if the final flush fails.
    pub fn close_target(&mut self) -> Result<()> {
        match self.state {
            TargetState::Open { .. } => {},
            TargetState::NotOpened => {
                return Err(Error::InvalidUsage(
                    "close_target called before open_target".to_string(),
                ));
            },
            TargetState::Closed => {
                return Err(Error::InvalidUsage(
                    "close_target called on an already-closed gate".to_string(),
                ));
            },
        }

        if let TargetState::Open { store: Some(store) } =
            std::mem::replace(&mut self.state, TargetState::Closed)
        {
            store.close()?;
        }

        let snapshot = self.counters();
        info!(
            stored = snapshot.stored,
            ignored = snapshot.ignored,
            "closed seen-set database"
        );
        Ok(())
    }

    /// Decides whether a request may be dispatched.
    ///
    /// Resolution order:
    /// 1. `enabled` = the request's override when present, else the
    ///    configured default. Disabled requests get [`Decision::Proceed`]
    ///    with no storage access and no counter change.
    /// 2. key = the request's override key when present, else its
    ///    fingerprint.
    /// 3. A key present in the seen-set yields [`Decision::Suppress`] and
    ///    bumps the `ignored` counter.
    ///
    /// Two requests racing for the same key before either is recorded will
    /// both get `Proceed`; the last recorded response wins. This
    /// check-then-mark window is inherent to deciding before the record
    /// exists, without per-key locking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] outside the open lifecycle window, or
    /// [`Error::Storage`] if the membership lookup fails.
    pub fn before_dispatch(&self, req: &CrawlRequest) -> Result<Decision> {
        let store = self.open_store("before_dispatch")?;

        if !self.dedup_enabled(req) {
            return Ok(Decision::Proceed);
        }
        let Some(store) = store else {
            return Ok(Decision::Proceed);
        };

        let key = req.dedup_key();
        if store.is_seen(key)? {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("crawl_once_requests_total", "outcome" => "suppressed").increment(1);
            debug!(key, "suppressing already-seen request");
            return Ok(Decision::Suppress);
        }

        Ok(Decision::Proceed)
    }

    /// Records a completed response's request in the seen-set.
    ///
    /// Must be called only after the response has been fully produced: it
    /// records success of the fetch, not merely the attempt. A request that
    /// never completes (network failure, cancelled, suppressed downstream)
    /// must not be marked seen. Pure side-effect hook: it never alters the
    /// set of outputs the host pipeline emits.
    ///
    /// The stored value is the response's override when present, else the
    /// current wall-clock timestamp. Re-marking an already-seen key simply
    /// overwrites the stored value and still bumps `stored`; a caller may
    /// intentionally re-confirm freshness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUsage`] outside the open lifecycle window, or
    /// [`Error::Storage`] if the durable write fails.
    pub fn after_response(&self, resp: &CrawlResponse, req: &CrawlRequest) -> Result<()> {
        let store = self.open_store("after_response")?;

        if !self.dedup_enabled(req) {
            return Ok(());
        }
        let Some(store) = store else {
            return Ok(());
        };

        let key = req.dedup_key();
        let value = resp
            .overrides
            .value
            .clone()
            .unwrap_or_else(SeenValue::timestamp_now);

        store.mark_seen(key, &value)?;
        self.counters.stored.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("crawl_once_requests_total", "outcome" => "stored").increment(1);
        debug!(key, "recorded response in seen-set");
        Ok(())
    }

    /// Returns a snapshot of the gate's counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            initial: self.counters.initial.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
        }
    }

    /// Resolves whether dedup applies to a request.
    fn dedup_enabled(&self, req: &CrawlRequest) -> bool {
        req.overrides.enabled.unwrap_or(self.config.default_enabled)
    }

    /// Returns the open store, or the pass-through marker when the mechanism
    /// is disabled.
    fn open_store(&self, operation: &str) -> Result<Option<&SeenStore>> {
        match &self.state {
            TargetState::Open { store } => Ok(store.as_ref()),
            TargetState::NotOpened => Err(Error::InvalidUsage(format!(
                "{operation} called before open_target"
            ))),
            TargetState::Closed => Err(Error::InvalidUsage(format!(
                "{operation} called after close_target"
            ))),
        }
    }
}

/// Sanitizes a target name into a filename stem.
///
/// Every character outside `[A-Za-z0-9._-]` becomes `_`. Names that are
/// empty or consist only of dots map to `_`, so a hostile target name cannot
/// escape the base directory.
#[must_use]
pub fn sanitize_target(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() || stem.bytes().all(|b| b == b'.') {
        "_".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn open_gate(dir: &std::path::Path, default_enabled: bool) -> DedupGate {
        let config = CrawlOnceConfig::new()
            .with_base_dir(dir)
            .with_default_enabled(default_enabled);
        let mut gate = DedupGate::new(config);
        gate.open_target("spider").unwrap();
        gate
    }

    #[test_case("spider", "spider"; "plain name unchanged")]
    #[test_case("my spider/v2", "my_spider_v2"; "separators replaced")]
    #[test_case("../../etc/passwd", ".._.._etc_passwd"; "traversal neutralized")]
    #[test_case("..", "_"; "dots only")]
    #[test_case("", "_"; "empty")]
    #[test_case("prices-2024.q1", "prices-2024.q1"; "dots dashes kept")]
    fn test_sanitize_target(name: &str, expected: &str) {
        assert_eq!(sanitize_target(name), expected);
    }

    #[test]
    fn test_store_path_uses_sanitized_stem() {
        let gate = DedupGate::new(CrawlOnceConfig::new().with_base_dir("/state"));
        assert_eq!(
            gate.store_path("my spider"),
            PathBuf::from("/state/my_spider.db")
        );
    }

    #[test]
    fn test_decision_before_open_is_invalid_usage() {
        let gate = DedupGate::new(CrawlOnceConfig::default());
        let req = CrawlRequest::new("fp").with_dedup(true);
        assert!(matches!(
            gate.before_dispatch(&req),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            gate.after_response(&CrawlResponse::new(), &req),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_double_open_is_invalid_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = open_gate(dir.path(), false);
        assert!(matches!(
            gate.open_target("spider"),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_close_without_open_is_invalid_usage() {
        let mut gate = DedupGate::new(CrawlOnceConfig::default());
        assert!(matches!(gate.close_target(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_use_after_close_is_invalid_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = open_gate(dir.path(), true);
        gate.close_target().unwrap();

        let req = CrawlRequest::new("fp");
        assert!(matches!(
            gate.before_dispatch(&req),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(gate.close_target(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_suppress_after_record() {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path(), false);

        let req = CrawlRequest::new("fp-1").with_dedup(true);
        assert_eq!(gate.before_dispatch(&req).unwrap(), Decision::Proceed);

        gate.after_response(&CrawlResponse::new(), &req).unwrap();
        assert_eq!(gate.before_dispatch(&req).unwrap(), Decision::Suppress);

        let counters = gate.counters();
        assert_eq!(counters.stored, 1);
        assert_eq!(counters.ignored, 1);
    }

    #[test]
    fn test_disabled_request_always_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path(), false);

        // Mark the fingerprint seen through an enabled request
        let enabled = CrawlRequest::new("fp-shared").with_dedup(true);
        gate.after_response(&CrawlResponse::new(), &enabled).unwrap();

        // A request without an override keeps the disabled default and is
        // never suppressed, regardless of prior seen-state
        let plain = CrawlRequest::new("fp-shared");
        assert_eq!(gate.before_dispatch(&plain).unwrap(), Decision::Proceed);

        // Its responses are not recorded either
        gate.after_response(&CrawlResponse::new(), &plain).unwrap();
        assert_eq!(gate.counters().stored, 1);
    }

    #[test]
    fn test_default_enabled_applies_without_override() {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path(), true);

        let req = CrawlRequest::new("fp-1");
        gate.after_response(&CrawlResponse::new(), &req).unwrap();
        assert_eq!(gate.before_dispatch(&req).unwrap(), Decision::Suppress);

        // Explicit false override beats the enabled default
        let opted_out = CrawlRequest::new("fp-1").with_dedup(false);
        assert_eq!(gate.before_dispatch(&opted_out).unwrap(), Decision::Proceed);
    }

    #[test]
    fn test_override_key_groups_distinct_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path(), true);

        let first = CrawlRequest::new("fp-a").with_dedup_key("X");
        let second = CrawlRequest::new("fp-b").with_dedup_key("X");

        gate.after_response(&CrawlResponse::new(), &first).unwrap();
        assert_eq!(gate.before_dispatch(&second).unwrap(), Decision::Suppress);

        // The raw fingerprints themselves were never recorded
        assert_eq!(
            gate.before_dispatch(&CrawlRequest::new("fp-a")).unwrap(),
            Decision::Proceed
        );
    }

    #[test]
    fn test_value_override_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let config = CrawlOnceConfig::new()
            .with_base_dir(dir.path())
            .with_default_enabled(true);
        let mut gate = DedupGate::new(config);
        gate.open_target("spider").unwrap();

        let req = CrawlRequest::new("fp-1");
        let resp = CrawlResponse::new().with_dedup_value("etag-99");
        gate.after_response(&resp, &req).unwrap();
        gate.close_target().unwrap();

        let store = SeenStore::open(dir.path().join("spider.db")).unwrap();
        assert_eq!(
            store.get("fp-1").unwrap(),
            Some(SeenValue::Text("etag-99".to_string()))
        );
        store.close().unwrap();
    }

    #[test]
    fn test_mechanism_disabled_is_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = CrawlOnceConfig::new()
            .with_enabled(false)
            .with_base_dir(dir.path().join("never-created"))
            .with_default_enabled(true);
        let mut gate = DedupGate::new(config);
        gate.open_target("spider").unwrap();

        let req = CrawlRequest::new("fp-1").with_dedup(true);
        gate.after_response(&CrawlResponse::new(), &req).unwrap();
        assert_eq!(gate.before_dispatch(&req).unwrap(), Decision::Proceed);
        gate.close_target().unwrap();

        // No storage was touched
        assert!(!dir.path().join("never-created").exists());
        assert_eq!(gate.counters(), CounterSnapshot::default());
    }

    #[test]
    fn test_initial_counter_reflects_existing_records() {
        let dir = tempfile::tempdir().unwrap();

        let gate1 = open_gate(dir.path(), true);
        assert_eq!(gate1.counters().initial, 0);
        gate1
            .after_response(&CrawlResponse::new(), &CrawlRequest::new("fp-1"))
            .unwrap();
        let mut gate1 = gate1;
        gate1.close_target().unwrap();

        let gate2 = open_gate(dir.path(), true);
        assert_eq!(gate2.counters().initial, 1);
    }

    #[test]
    fn test_remark_increments_stored_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path(), true);

        let req = CrawlRequest::new("fp-1");
        gate.after_response(&CrawlResponse::new(), &req).unwrap();
        gate.after_response(&CrawlResponse::new(), &req).unwrap();

        assert_eq!(gate.counters().stored, 2);
    }

    #[test]
    fn test_decision_is_suppress() {
        assert!(Decision::Suppress.is_suppress());
        assert!(!Decision::Proceed.is_suppress());
    }
}
