//! Deterministic cache keys for lookup queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Prefix shared by every lookup cache key.
pub const KEY_PREFIX: &str = "lookup:";

/// Parameters of a single lookup request.
///
/// Field order matters: it is the canonical order used both for the request
/// body and for key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParams {
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  /// 1-based page number
  pub page: u32,
  pub page_size: u32,
}

impl QueryParams {
  pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>, page: u32) -> Self {
    Self {
      start_date,
      end_date,
      page: page.max(1),
      page_size: DEFAULT_PAGE_SIZE,
    }
  }

  pub fn with_page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Same date range and page size, different page.
  pub fn with_page(mut self, page: u32) -> Self {
    self.page = page.max(1);
    self
  }

  /// Human readable form for logs.
  pub fn describe(&self) -> String {
    format!(
      "{} to {} (page {}, size {})",
      self
        .start_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "beginning".to_string()),
      self
        .end_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "now".to_string()),
      self.page,
      self.page_size
    )
  }
}

/// Key addressing one cached result page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Derive the cache key for a query.
///
/// The params are serialized as a struct, so fields always appear in
/// declaration order regardless of how the caller built them.
pub fn build_key(params: &QueryParams) -> CacheKey {
  let canonical = canonical_form(params);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  CacheKey(format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize())))
}

fn canonical_form(params: &QueryParams) -> String {
  let date = |d: Option<NaiveDate>| match d {
    Some(d) => format!("\"{}\"", d.format("%Y-%m-%d")),
    None => "null".to_string(),
  };
  format!(
    "{{\"start_date\":{},\"end_date\":{},\"page\":{},\"page_size\":{}}}",
    date(params.start_date),
    date(params.end_date),
    params.page,
    params.page_size
  )
}

/// Number of pages needed to show `total` records.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
  if page_size == 0 {
    return 0;
  }
  total.div_ceil(u64::from(page_size))
}
