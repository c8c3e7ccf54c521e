//! Expiry policy for cached result pages.
//!
//! Entries are checked lazily: expiry is only detected when a key is read,
//! and the stale entry is evicted right there. Nothing sweeps the store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::{CacheStore, StoreError};
use crate::api::types::ResultPage;

/// How long a cached page stays valid, in milliseconds (72 hours).
pub const RETENTION_MS: i64 = 259_200_000;

pub fn retention() -> Duration {
  Duration::milliseconds(RETENTION_MS)
}

/// What is persisted under a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
  pub payload: ResultPage,
}

/// Why a lookup produced no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
  Absent,
  Expired,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
  Hit(ResultPage),
  Miss(MissReason),
}

/// Look `key` up, evicting it if it is corrupt or older than the retention window.
pub fn lookup<S: CacheStore + ?Sized>(store: &S, key: &CacheKey, now: DateTime<Utc>) -> Lookup {
  let raw = match store.get(key.as_str()) {
    Ok(Some(raw)) => raw,
    Ok(None) => return Lookup::Miss(MissReason::Absent),
    Err(e) => {
      warn!(key = %key, error = %e, "cache read failed");
      return Lookup::Miss(MissReason::Absent);
    }
  };

  let entry: CacheEntry = match serde_json::from_str(&raw) {
    Ok(entry) => entry,
    Err(e) => {
      warn!(key = %key, error = %e, "discarding corrupt cache entry");
      evict(store, key);
      return Lookup::Miss(MissReason::Absent);
    }
  };

  let age = now - entry.timestamp;
  if age >= retention() {
    debug!(key = %key, age_hours = age.num_hours(), "cache entry expired");
    evict(store, key);
    return Lookup::Miss(MissReason::Expired);
  }

  debug!(key = %key, age_mins = age.num_minutes(), "cache hit");
  Lookup::Hit(entry.payload)
}

/// Write `payload` under `key`, replacing whatever was there.
pub fn store<S: CacheStore + ?Sized>(
  store: &S,
  key: &CacheKey,
  payload: &ResultPage,
  now: DateTime<Utc>,
) -> Result<(), StoreError> {
  let entry = CacheEntry {
    timestamp: now,
    payload: payload.clone(),
  };
  let raw = serde_json::to_string(&entry)
    .map_err(|e| StoreError::Backend(format!("Failed to serialize cache entry: {}", e)))?;
  store.set(key.as_str(), &raw)
}

/// Whether anything is stored under `key`, valid or not.
pub fn contains<S: CacheStore + ?Sized>(store: &S, key: &CacheKey) -> bool {
  matches!(store.get(key.as_str()), Ok(Some(_)))
}

fn evict<S: CacheStore + ?Sized>(store: &S, key: &CacheKey) {
  if let Err(e) = store.remove(key.as_str()) {
    warn!(key = %key, error = %e, "failed to evict cache entry");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::record;
  use crate::cache::key::{build_key, QueryParams};
  use crate::cache::store::{FailingStore, MemoryStore};
  use chrono::TimeZone;
  use serde_json::json;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
  }

  fn page() -> ResultPage {
    ResultPage::new(vec![record(json!({"id": 1, "name": "Ada", "note": null}))], 1)
  }

  fn key() -> CacheKey {
    build_key(&QueryParams::new(None, None, 1))
  }

  #[test]
  fn test_absent_key_is_a_miss() {
    let backend = MemoryStore::new();
    assert_eq!(lookup(&backend, &key(), t0()), Lookup::Miss(MissReason::Absent));
  }

  #[test]
  fn test_store_then_lookup_returns_payload() {
    let backend = MemoryStore::new();
    store(&backend, &key(), &page(), t0()).unwrap();

    assert_eq!(
      lookup(&backend, &key(), t0() + Duration::seconds(1)),
      Lookup::Hit(page())
    );
  }

  #[test]
  fn test_entry_valid_until_retention() {
    let backend = MemoryStore::new();
    store(&backend, &key(), &page(), t0()).unwrap();

    let near_expiry = t0() + retention() - Duration::hours(1);
    assert_eq!(lookup(&backend, &key(), near_expiry), Lookup::Hit(page()));

    let last_valid = t0() + retention() - Duration::milliseconds(1);
    assert_eq!(lookup(&backend, &key(), last_valid), Lookup::Hit(page()));
  }

  #[test]
  fn test_expired_entry_is_evicted() {
    let backend = MemoryStore::new();
    store(&backend, &key(), &page(), t0()).unwrap();

    let expired = t0() + retention() + Duration::seconds(1);
    assert_eq!(
      lookup(&backend, &key(), expired),
      Lookup::Miss(MissReason::Expired)
    );
    assert_eq!(backend.len(), 0);
    assert_eq!(
      lookup(&backend, &key(), expired),
      Lookup::Miss(MissReason::Absent)
    );
  }

  #[test]
  fn test_exact_retention_boundary_is_expired() {
    let backend = MemoryStore::new();
    store(&backend, &key(), &page(), t0()).unwrap();

    assert_eq!(
      lookup(&backend, &key(), t0() + retention()),
      Lookup::Miss(MissReason::Expired)
    );
  }

  #[test]
  fn test_corrupt_entry_is_evicted_as_absent() {
    let backend = MemoryStore::new();
    backend.set(key().as_str(), "{not json").unwrap();

    assert_eq!(lookup(&backend, &key(), t0()), Lookup::Miss(MissReason::Absent));
    assert_eq!(backend.len(), 0);
  }

  #[test]
  fn test_store_overwrites() {
    let backend = MemoryStore::new();
    store(&backend, &key(), &page(), t0()).unwrap();

    let newer = ResultPage::new(vec![record(json!({"id": 2}))], 7);
    store(&backend, &key(), &newer, t0()).unwrap();

    assert_eq!(lookup(&backend, &key(), t0()), Lookup::Hit(newer));
  }

  #[test]
  fn test_contains_ignores_expiry() {
    let backend = MemoryStore::new();
    assert!(!contains(&backend, &key()));

    store(&backend, &key(), &page(), t0() - Duration::hours(100)).unwrap();
    assert!(contains(&backend, &key()));
  }

  #[test]
  fn test_entry_timestamp_is_epoch_millis() {
    let entry = CacheEntry {
      timestamp: t0(),
      payload: ResultPage::default(),
    };
    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["timestamp"], json!(t0().timestamp_millis()));
    assert_eq!(value["payload"], json!({"rows": [], "total": 0}));
  }

  #[test]
  fn test_backend_errors_read_as_absent() {
    let backend = FailingStore;

    assert_eq!(lookup(&backend, &key(), t0()), Lookup::Miss(MissReason::Absent));
    assert!(!contains(&backend, &key()));
    assert!(matches!(
      store(&backend, &key(), &page(), t0()),
      Err(StoreError::Backend(_))
    ));
  }

  #[test]
  fn test_quota_error_is_returned_from_store() {
    let backend = MemoryStore::with_quota(16);
    let result = store(&backend, &key(), &page(), t0());
    assert!(matches!(result, Err(StoreError::QuotaExceeded { .. })));
  }
}
