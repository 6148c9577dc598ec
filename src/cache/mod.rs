//! Persistent caching for template lists and generated gitignore content.
//!
//! This module provides:
//! - A [`StateStore`] abstraction over the host's key-value storage
//! - TTL freshness checks and size-bounded eviction
//! - A [`CacheLayer`] that maps the two cached resources onto store keys

mod layer;
mod storage;
mod traits;

pub use layer::{keys, CacheLayer};
pub use storage::{MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::{evict, is_valid, CacheEntry, ContentCache, StateStore};
