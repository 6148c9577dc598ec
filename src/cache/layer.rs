//! Typed view over the state store for the two cached resources.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{evict, is_valid, CacheEntry, ContentCache, StateStore};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Storage keys for persisted state.
pub mod keys {
  pub const TEMPLATE_LIST: &str = "yagi.gitignoreTemplateList";
  pub const TEMPLATE_LIST_TIMESTAMP: &str = "yagi.gitignoreTemplateListTimestamp";
  pub const GITIGNORE_CACHE: &str = "yagi.gitignoreCache";
}

/// Cache layer that reads and writes the template list and content cache.
///
/// Every write replaces a whole value, so readers never see a partial update.
pub struct CacheLayer<S: StateStore> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S: StateStore> CacheLayer<S> {
  /// Create a new cache layer over the given store, using the wall clock.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the time source.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn now(&self) -> i64 {
    self.clock.now_millis()
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// The cached template list, if present and younger than `ttl`.
  pub fn fresh_templates(&self, ttl: Duration) -> Result<Option<Vec<String>>> {
    let list: Option<Vec<String>> = self.storage.get(keys::TEMPLATE_LIST)?;
    let timestamp: Option<i64> = self.storage.get(keys::TEMPLATE_LIST_TIMESTAMP)?;

    if is_valid(list.as_ref(), timestamp, self.now(), ttl) {
      Ok(list)
    } else {
      Ok(None)
    }
  }

  /// Record a freshly fetched template list, stamped with the current time.
  pub fn store_templates(&self, templates: &[String]) -> Result<()> {
    self.storage.set(keys::TEMPLATE_LIST, &templates)?;
    self
      .storage
      .set(keys::TEMPLATE_LIST_TIMESTAMP, &self.now())?;
    Ok(())
  }

  /// The whole persisted content cache (empty if never written).
  pub fn content_cache(&self) -> Result<ContentCache> {
    Ok(
      self
        .storage
        .get::<ContentCache>(keys::GITIGNORE_CACHE)?
        .unwrap_or_default(),
    )
  }

  /// Content cached under `key`, if younger than `ttl`.
  pub fn fresh_content(&self, cache: &ContentCache, key: &str, ttl: Duration) -> Option<String> {
    let entry = cache.get(key)?;
    if is_valid(Some(&entry.value), Some(entry.timestamp), self.now(), ttl) {
      Some(entry.value.clone())
    } else {
      None
    }
  }

  /// Merge one entry into `cache`, trim it to `max_size` and write it back.
  pub fn store_content(
    &self,
    mut cache: ContentCache,
    key: &str,
    content: &str,
    max_size: usize,
  ) -> Result<()> {
    cache.insert(
      key.to_string(),
      CacheEntry::new(content.to_string(), self.now()),
    );

    let before = cache.len();
    let cache = evict(cache, max_size);
    if cache.len() < before {
      debug!(evicted = before - cache.len(), max_size, "evicted gitignore cache entries");
    }

    self.storage.set(keys::GITIGNORE_CACHE, &cache)
  }

  /// Remove every persisted key. Safe to call repeatedly.
  pub fn clear_all(&self) -> Result<()> {
    self.storage.remove(keys::TEMPLATE_LIST)?;
    self.storage.remove(keys::TEMPLATE_LIST_TIMESTAMP)?;
    self.storage.remove(keys::GITIGNORE_CACHE)?;
    Ok(())
  }
}

impl<S: StateStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::clock::ManualClock;

  const HOUR: Duration = Duration::from_secs(3600);

  fn layer() -> (CacheLayer<MemoryStorage>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let layer = CacheLayer::new(MemoryStorage::new()).with_clock(clock.clone());
    (layer, clock)
  }

  #[test]
  fn template_list_expires_after_ttl() {
    let (layer, clock) = layer();
    assert_eq!(layer.fresh_templates(HOUR).unwrap(), None);

    layer
      .store_templates(&["node".to_string(), "rust".to_string()])
      .unwrap();
    assert_eq!(
      layer.fresh_templates(HOUR).unwrap(),
      Some(vec!["node".to_string(), "rust".to_string()])
    );

    clock.advance(3_600_000 - 1);
    assert!(layer.fresh_templates(HOUR).unwrap().is_some());

    clock.advance(1);
    assert_eq!(layer.fresh_templates(HOUR).unwrap(), None);
  }

  #[test]
  fn list_without_timestamp_is_a_miss() {
    let (layer, _) = layer();
    layer
      .storage()
      .set(keys::TEMPLATE_LIST, &vec!["node".to_string()])
      .unwrap();

    assert_eq!(layer.fresh_templates(HOUR).unwrap(), None);
  }

  #[test]
  fn content_is_stored_and_expires() {
    let (layer, clock) = layer();
    let cache = layer.content_cache().unwrap();
    assert!(cache.is_empty());

    layer.store_content(cache, "node,rust", "node_modules/\ntarget/\n", 10).unwrap();

    let cache = layer.content_cache().unwrap();
    assert_eq!(
      layer.fresh_content(&cache, "node,rust", HOUR).as_deref(),
      Some("node_modules/\ntarget/\n")
    );
    assert_eq!(layer.fresh_content(&cache, "go", HOUR), None);

    clock.advance(3_600_000);
    assert_eq!(layer.fresh_content(&cache, "node,rust", HOUR), None);
  }

  #[test]
  fn store_content_enforces_size_limit() {
    let (layer, clock) = layer();

    for key in ["a", "b", "c", "d"] {
      let cache = layer.content_cache().unwrap();
      layer.store_content(cache, key, key, 2).unwrap();
      clock.advance(10);
    }

    let cache = layer.content_cache().unwrap();
    let keys: Vec<_> = cache.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["c", "d"]);
  }

  #[test]
  fn clear_all_removes_everything() {
    let (layer, _) = layer();
    layer.store_templates(&["node".to_string()]).unwrap();
    layer
      .store_content(ContentCache::new(), "node", "node_modules/", 5)
      .unwrap();

    layer.clear_all().unwrap();
    layer.clear_all().unwrap();

    assert!(layer.storage().is_empty());
    assert_eq!(layer.fresh_templates(HOUR).unwrap(), None);
    assert!(layer.content_cache().unwrap().is_empty());
  }
}
