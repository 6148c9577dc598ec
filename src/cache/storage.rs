//! State store backends: SQLite, in-memory and no-op.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::StateStore;
use crate::error::{Error, Result};

/// Store that doesn't keep anything.
/// Used when caching is disabled - every read misses.
pub struct NoopStorage;

impl StateStore for NoopStorage {
  fn get_raw(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  fn set_raw(&self, _key: &str, _value: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// Process-local store backed by a hash map.
#[derive(Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn values(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    self
      .values
      .lock()
      .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
  }

  /// Number of keys currently stored. Counts through a poisoned lock.
  pub fn len(&self) -> usize {
    self
      .values
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl StateStore for MemoryStorage {
  fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
    Ok(self.values()?.get(key).cloned())
  }

  fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
    self.values()?.insert(key.to_string(), value.to_vec());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.values()?.remove(key);
    Ok(())
  }
}

/// SQLite-based state store.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const STATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS state (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStorage {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage_with("Failed to create state directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::storage_with(
        format!("Failed to open state database at {}", path.display()),
        e,
      )
    })?;

    Self::with_connection(conn)
  }

  /// Store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::storage_with("Failed to open in-memory state database", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("Could not determine data directory"))?;

    Ok(data_dir.join("yagi").join("state.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(STATE_SCHEMA)
      .map_err(|e| Error::storage_with("Failed to run state migrations", e))?;

    Ok(())
  }
}

impl StateStore for SqliteStorage {
  fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let conn = self.conn()?;

    conn
      .query_row(
        "SELECT value FROM state WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| Error::storage_with(format!("Failed to read state '{}'", key), e))
  }

  fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO state (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| Error::storage_with(format!("Failed to write state '{}'", key), e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute("DELETE FROM state WHERE key = ?", params![key])
      .map_err(|e| Error::storage_with(format!("Failed to remove state '{}'", key), e))?;

    Ok(())
  }
}
