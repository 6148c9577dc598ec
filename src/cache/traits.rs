//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// Persistent key-value state supplied by the host.
///
/// Backends only move bytes; values are JSON-encoded by the provided
/// [`get`](StateStore::get) and [`set`](StateStore::set) helpers.
pub trait StateStore: Send + Sync {
  /// Raw bytes stored under `key`, if any.
  fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

  /// Replace whatever is stored under `key`.
  fn set_raw(&self, key: &str, value: &[u8]) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self.get_raw(key)? {
      Some(data) => serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| Error::storage_with(format!("Failed to decode state '{}'", key), e)),
      None => Ok(None),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)
      .map_err(|e| Error::storage_with(format!("Failed to encode state '{}'", key), e))?;
    self.set_raw(key, &data)
  }
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
  fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
    (**self).get_raw(key)
  }

  fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
    (**self).set_raw(key, value)
  }

  fn remove(&self, key: &str) -> Result<()> {
    (**self).remove(key)
  }
}

/// A cached value and when it was written (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
  #[serde(rename = "content")]
  pub value: V,
  pub timestamp: i64,
}

impl<V> CacheEntry<V> {
  pub fn new(value: V, timestamp: i64) -> Self {
    Self { value, timestamp }
  }
}

/// Generated gitignore content keyed by canonical template key.
pub type ContentCache = BTreeMap<String, CacheEntry<String>>;

/// Whether a value cached at `timestamp` is still fresh at `now`.
///
/// Missing value or timestamp means it was never fetched. An entry exactly
/// `ttl` old is expired.
pub fn is_valid<V>(value: Option<&V>, timestamp: Option<i64>, now: i64, ttl: Duration) -> bool {
  match (value, timestamp) {
    (Some(_), Some(timestamp)) => {
      let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
      now.saturating_sub(timestamp) < ttl
    }
    _ => false,
  }
}

/// Keep the `max_size` most recently written entries.
///
/// Returns the input untouched when it already fits. Entries with equal
/// timestamps keep key order, so the smaller key survives a tie.
pub fn evict(cache: ContentCache, max_size: usize) -> ContentCache {
  if cache.len() <= max_size {
    return cache;
  }

  let mut entries: Vec<_> = cache.into_iter().collect();
  entries.sort_by(|(_, a), (_, b)| b.timestamp.cmp(&a.timestamp));
  entries.truncate(max_size);

  entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  const TTL: Duration = Duration::from_millis(1000);

  fn cache_of(stamps: &[(&str, i64)]) -> ContentCache {
    stamps
      .iter()
      .map(|(k, t)| (k.to_string(), CacheEntry::new(format!("# {}", k), *t)))
      .collect()
  }

  #[test]
  fn valid_within_ttl() {
    assert!(is_valid(Some(&"x"), Some(5000), 5000, TTL));
    assert!(is_valid(Some(&"x"), Some(5000), 5999, TTL));
  }

  #[test]
  fn expired_at_exact_ttl_boundary() {
    assert!(!is_valid(Some(&"x"), Some(5000), 6000, TTL));
    assert!(!is_valid(Some(&"x"), Some(5000), 9000, TTL));
  }

  #[test]
  fn never_fetched_is_invalid() {
    assert!(!is_valid::<&str>(None, Some(5000), 5000, TTL));
    assert!(!is_valid(Some(&"x"), None, 5000, TTL));
    assert!(!is_valid::<&str>(None, None, 0, TTL));
  }

  #[test]
  fn evict_keeps_newest_entries() {
    let cache = cache_of(&[("a", 1000), ("b", 2000), ("c", 3000), ("d", 4000), ("e", 5000)]);

    let kept = evict(cache, 3);
    let keys: Vec<_> = kept.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["c", "d", "e"]);
  }

  #[test]
  fn evict_is_noop_when_within_limit() {
    let cache = cache_of(&[("a", 1), ("b", 2)]);
    assert_eq!(evict(cache.clone(), 2), cache);
    assert_eq!(evict(cache.clone(), 10), cache);
  }

  #[test]
  fn evict_retains_only_entries_newer_than_discarded() {
    let cache = cache_of(&[
      ("node", 40),
      ("rust", 10),
      ("go", 70),
      ("java", 20),
      ("python", 90),
      ("ruby", 30),
      ("swift", 60),
    ]);

    let kept = evict(cache.clone(), 4);
    assert_eq!(kept.len(), 4);

    let oldest_kept = kept.values().map(|e| e.timestamp).min().unwrap();
    for (key, entry) in &cache {
      if !kept.contains_key(key) {
        assert!(entry.timestamp <= oldest_kept, "{} should have been kept", key);
      }
    }
  }

  #[test]
  fn evict_breaks_ties_by_key() {
    let cache = cache_of(&[("b", 100), ("a", 100), ("c", 100), ("d", 50)]);

    let kept = evict(cache, 2);
    let keys: Vec<_> = kept.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "b"]);
  }

  #[test]
  fn entry_serializes_with_content_field() {
    let entry = CacheEntry::new("*.log".to_string(), 42);
    let json = serde_json::to_string(&entry).unwrap();
    assert_eq!(json, r#"{"content":"*.log","timestamp":42}"#);
  }
}
