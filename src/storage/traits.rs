//! Seen-set backend trait.

use crate::Result;
use crate::models::SeenValue;

/// Trait for seen-set backends.
///
/// A seen-set is the durable record of which dedup keys have already been
/// processed for one crawl target. Implementations must serialize all reads
/// and writes and commit every mutation durably before returning.
pub trait SeenBackend: Send + Sync {
    /// Durably upserts a key with the given value.
    ///
    /// After this call returns, [`is_seen`](Self::is_seen) must return `true`
    /// for the key even across an immediate crash-restart. Re-marking an
    /// existing key overwrites its value (last-write-wins).
    fn mark_seen(&self, key: &str, value: &SeenValue) -> Result<()>;

    /// Checks whether a key has been marked seen.
    ///
    /// Reflects all previously committed [`mark_seen`](Self::mark_seen) and
    /// [`unsee`](Self::unsee) calls in the current and all prior runs against
    /// the same backing file.
    fn is_seen(&self, key: &str) -> Result<bool>;

    /// Removes a key, returning whether a record was deleted.
    ///
    /// Removing an absent key is a no-op, not an error.
    fn unsee(&self, key: &str) -> Result<bool>;

    /// Returns the number of records currently stored.
    fn count(&self) -> Result<usize>;
}
