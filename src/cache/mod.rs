//! Time-expiring cache for lookup result pages.
//!
//! - Keys are derived deterministically from the query parameters
//! - Entries carry their write timestamp and expire after a fixed retention window
//! - Expiry is lazy: stale entries are evicted when they are next read
//! - Storage is pluggable behind the `CacheStore` trait (SQLite on disk, or in memory)

pub mod key;
pub mod policy;
pub mod store;

pub use key::{build_key, total_pages, CacheKey, QueryParams, DEFAULT_PAGE_SIZE, KEY_PREFIX};
pub use policy::Lookup;
pub use store::{CacheStore, MemoryStore, SqliteStore};
