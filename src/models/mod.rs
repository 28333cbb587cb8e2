//! Data models for crawl-once.
//!
//! The gate consumes request-like and response-like objects; both are thin
//! carriers for an externally computed fingerprint and a structured bag of
//! per-request dedup overrides.

use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};

/// The scalar value stored for a seen key.
///
/// Stored verbatim and never interpreted by the store. By default the gate
/// records the wall-clock timestamp at which the response was processed; a
/// response override can substitute any other scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeenValue {
    /// A signed integer, the default timestamp form.
    Integer(i64),
    /// A floating-point number.
    Real(f64),
    /// An arbitrary text value.
    Text(String),
}

impl SeenValue {
    /// Creates the default value for a key: the current Unix timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn timestamp_now() -> Self {
        Self::Integer(crate::current_timestamp() as i64)
    }
}

impl From<i64> for SeenValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SeenValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SeenValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SeenValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl std::fmt::Display for SeenValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl ToSql for SeenValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl FromSql for SeenValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(v) => Ok(Self::Integer(v)),
            ValueRef::Real(v) => Ok(Self::Real(v)),
            ValueRef::Text(v) => String::from_utf8(v.to_vec())
                .map(Self::Text)
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Null | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// Per-request dedup overrides.
///
/// A structured bag of the three recognized override keys, set by the
/// surrounding pipeline or user code. Each field takes precedence over the
/// corresponding computed default when present:
///
/// - `enabled` overrides the gate's configured default behavior
/// - `key` overrides the request fingerprint as the dedup identity
/// - `value` overrides the timestamp stored for a seen key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupOverrides {
    /// Explicit dedup enablement for this request.
    pub enabled: Option<bool>,
    /// Explicit dedup identity, replacing the fingerprint.
    pub key: Option<String>,
    /// Explicit value to store, replacing the timestamp.
    pub value: Option<SeenValue>,
}

impl DedupOverrides {
    /// Creates an empty override bag.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: None,
            key: None,
            value: None,
        }
    }
}

/// The request-like object the gate consumes.
///
/// Carries a deterministic fingerprint computed by the host crawling system
/// over the request's defining fields (method, URL, body, ...) plus the
/// override bag. The gate never computes fingerprints itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlRequest {
    /// Deterministic request identity, supplied by the host.
    pub fingerprint: String,
    /// Per-request dedup overrides.
    pub overrides: DedupOverrides,
}

impl CrawlRequest {
    /// Creates a request with the given fingerprint and no overrides.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            overrides: DedupOverrides::new(),
        }
    }

    /// Sets the explicit dedup enablement for this request.
    #[must_use]
    pub const fn with_dedup(mut self, enabled: bool) -> Self {
        self.overrides.enabled = Some(enabled);
        self
    }

    /// Sets an explicit dedup key, overriding the fingerprint.
    ///
    /// Lets a caller group multiple physically-different requests under one
    /// logical dedup identity.
    #[must_use]
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.overrides.key = Some(key.into());
        self
    }

    /// Returns the dedup identity: the override key when present, else the
    /// fingerprint.
    #[must_use]
    pub fn dedup_key(&self) -> &str {
        self.overrides.key.as_deref().unwrap_or(&self.fingerprint)
    }
}

/// The response-like object the gate consumes.
///
/// Only the `value` override is read from a response; enablement and key
/// resolution always go through the originating request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlResponse {
    /// Per-response dedup overrides.
    pub overrides: DedupOverrides,
}

impl CrawlResponse {
    /// Creates a response with no overrides.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            overrides: DedupOverrides::new(),
        }
    }

    /// Sets an explicit value to store instead of the timestamp.
    #[must_use]
    pub fn with_dedup_value(mut self, value: impl Into<SeenValue>) -> Self {
        self.overrides.value = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_defaults_to_fingerprint() {
        let req = CrawlRequest::new("fp-abc");
        assert_eq!(req.dedup_key(), "fp-abc");
    }

    #[test]
    fn test_dedup_key_override_wins() {
        let req = CrawlRequest::new("fp-abc").with_dedup_key("logical-X");
        assert_eq!(req.dedup_key(), "logical-X");
    }

    #[test]
    fn test_seen_value_from_impls() {
        assert_eq!(SeenValue::from(42), SeenValue::Integer(42));
        assert_eq!(SeenValue::from(1.5), SeenValue::Real(1.5));
        assert_eq!(SeenValue::from("v"), SeenValue::Text("v".to_string()));
    }

    #[test]
    fn test_seen_value_display() {
        assert_eq!(SeenValue::Integer(7).to_string(), "7");
        assert_eq!(SeenValue::Text("etag".to_string()).to_string(), "etag");
    }

    #[test]
    fn test_seen_value_timestamp_now() {
        let SeenValue::Integer(ts) = SeenValue::timestamp_now() else {
            panic!("timestamp_now must produce an integer");
        };
        assert!(ts > 1_577_836_800);
    }

    #[test]
    fn test_seen_value_serde_untagged() {
        let v: SeenValue = serde_json::from_str("12").unwrap();
        assert_eq!(v, SeenValue::Integer(12));
        let v: SeenValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(v, SeenValue::Text("abc".to_string()));
        assert_eq!(serde_json::to_string(&SeenValue::Real(0.5)).unwrap(), "0.5");
    }

    #[test]
    fn test_overrides_default_is_empty() {
        let overrides = DedupOverrides::default();
        assert!(overrides.enabled.is_none());
        assert!(overrides.key.is_none());
        assert!(overrides.value.is_none());
    }

    #[test]
    fn test_response_value_override() {
        let resp = CrawlResponse::new().with_dedup_value("etag-123");
        assert_eq!(
            resp.overrides.value,
            Some(SeenValue::Text("etag-123".to_string()))
        );
    }
}
