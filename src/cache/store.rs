//! Key-value cache store trait and its SQLite and in-memory backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The write would push the store past its capacity
  #[error("cache quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
  QuotaExceeded { needed: u64, quota: u64 },
  #[error("cache backend error: {0}")]
  Backend(String),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::Backend(e.to_string())
  }
}

/// Durable string-keyed store used by the cache policy.
pub trait CacheStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

  /// Insert or overwrite `key`.
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Bytes used by a key/value pair for quota accounting.
fn entry_size(key: &str, value: &str) -> u64 {
  (key.len() + value.len()) as u64
}

/// In-process store, used when the cache database can't be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  quota: Option<u64>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a store that rejects writes beyond `quota` bytes.
  pub fn with_quota(quota: u64) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      quota: Some(quota),
    }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.lock().map(|e| e.len()).unwrap_or(0)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
    self
      .entries
      .lock()
      .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut entries = self.lock()?;

    if let Some(quota) = self.quota {
      let used: u64 = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| entry_size(k, v))
        .sum();
      let needed = used + entry_size(key, value);
      if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
      }
    }

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.lock()?.remove(key);
    Ok(())
  }
}

/// Store whose every operation fails, as a broken or locked database would.
#[cfg(test)]
pub struct FailingStore;

#[cfg(test)]
impl CacheStore for FailingStore {
  fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
    Err(StoreError::Backend("disk I/O error".to_string()))
  }

  fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
    Err(StoreError::Backend("disk I/O error".to_string()))
  }

  fn remove(&self, _key: &str) -> Result<(), StoreError> {
    Err(StoreError::Backend("disk I/O error".to_string()))
  }
}

/// SQLite-based cache store, scoped to this device.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  quota: Option<u64>,
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open(quota: Option<u64>) -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path, quota)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path, quota: Option<u64>) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, quota)
  }

  /// Open a throwaway store that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory(quota: Option<u64>) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn, quota)
  }

  fn with_connection(conn: Connection, quota: Option<u64>) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      quota,
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("lookup-dash").join("cache.db"))
  }

  /// Delete every entry whose key starts with `prefix`. Returns the number removed.
  pub fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE substr(cache_key, 1, length(?1)) = ?1",
      params![prefix],
    )?;
    Ok(removed)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))
  }
}

impl CacheStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let conn = self.lock()?;
    let value = conn
      .query_row(
        "SELECT value FROM cache_entries WHERE cache_key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;

    if let Some(quota) = self.quota {
      let used: i64 = conn.query_row(
        "SELECT COALESCE(SUM(length(CAST(cache_key AS BLOB)) + length(CAST(value AS BLOB))), 0)
         FROM cache_entries WHERE cache_key != ?",
        params![key],
        |row| row.get(0),
      )?;
      let needed = used.max(0) as u64 + entry_size(key, value);
      if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
      }
    }

    conn.execute(
      "INSERT OR REPLACE INTO cache_entries (cache_key, value, written_at)
       VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM cache_entries WHERE cache_key = ?",
      params![key],
    )?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn CacheStore) {
    assert_eq!(store.get("a").unwrap(), None);

    store.set("a", "one").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("one"));

    store.set("a", "two").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("two"));

    store.remove("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);

    // Removing twice is fine
    store.remove("a").unwrap();
  }

  #[test]
  fn test_memory_store_basics() {
    exercise(&MemoryStore::new());
  }

  #[test]
  fn test_sqlite_store_basics() {
    exercise(&SqliteStore::open_in_memory(None).unwrap());
  }

  #[test]
  fn test_memory_store_quota() {
    let store = MemoryStore::with_quota(10);
    store.set("k1", "abc").unwrap();

    let err = store.set("k2", "too long value").unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { quota: 10, .. }));
    assert_eq!(store.get("k2").unwrap(), None);

    // Overwriting an existing key only counts the new value
    store.set("k1", "abcdefgh").unwrap();
  }

  #[test]
  fn test_sqlite_store_quota() {
    let store = SqliteStore::open_in_memory(Some(10)).unwrap();
    store.set("k1", "abc").unwrap();

    let err = store.set("k2", "too long value").unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { .. }));
    assert_eq!(store.get("k2").unwrap(), None);

    store.set("k1", "abcdefgh").unwrap();
    assert_eq!(store.get("k1").unwrap().as_deref(), Some("abcdefgh"));
  }

  #[test]
  fn test_sqlite_clear_prefix() {
    let store = SqliteStore::open_in_memory(None).unwrap();
    store.set("lookup:1", "a").unwrap();
    store.set("lookup:2", "b").unwrap();
    store.set("other", "c").unwrap();

    assert_eq!(store.clear_prefix("lookup:").unwrap(), 2);
    assert_eq!(store.get("lookup:1").unwrap(), None);
    assert_eq!(store.get("other").unwrap().as_deref(), Some("c"));
  }

  #[test]
  fn test_sqlite_clear_prefix_multibyte() {
    let store = SqliteStore::open_in_memory(None).unwrap();
    store.set("café:1", "a").unwrap();
    store.set("café:2", "b").unwrap();
    store.set("cafe:1", "c").unwrap();
    store.set("caf", "d").unwrap();

    assert_eq!(store.clear_prefix("café:").unwrap(), 2);
    assert_eq!(store.get("café:1").unwrap(), None);
    assert_eq!(store.get("cafe:1").unwrap().as_deref(), Some("c"));
    assert_eq!(store.get("caf").unwrap().as_deref(), Some("d"));
  }

  #[test]
  fn test_sqlite_store_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("lookup-dash-test-{}", std::process::id()));
    let path = dir.join("cache.db");

    {
      let store = SqliteStore::open_at(&path, None).unwrap();
      store.set("k", "v").unwrap();
    }
    {
      let store = SqliteStore::open_at(&path, None).unwrap();
      assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    let _ = std::fs::remove_dir_all(&dir);
  }
}
