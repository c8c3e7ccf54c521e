//! Serde types matching the records API request and response bodies.
//!
//! These are kept apart from the domain types so missing or null fields can be
//! normalized in one place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Record, ResultPage};

// ============================================================================
// Lookup endpoint
// ============================================================================

/// Response body of `POST /nikeeta-lookup`.
///
/// Both fields may be missing or null; neither is allowed to leak past here.
#[derive(Debug, Default, Deserialize)]
pub struct ApiLookupResponse {
  #[serde(default)]
  pub data: Option<Vec<Record>>,
  #[serde(default)]
  pub total: Option<u64>,
}

impl From<ApiLookupResponse> for ResultPage {
  fn from(response: ApiLookupResponse) -> Self {
    ResultPage::new(
      response.data.unwrap_or_default(),
      response.total.unwrap_or_default(),
    )
  }
}

// ============================================================================
// Filtered views
// ============================================================================

/// Body of the `filter-*` and `pending` endpoints.
///
/// Each column maps to the accepted values. Date columns take either one
/// value (exact match) or two (inclusive range).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiFilterRequest {
  pub filters: BTreeMap<String, Vec<String>>,
}

impl ApiFilterRequest {
  /// Parse `column=value[,value]` arguments, dropping empty values.
  pub fn from_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for arg in args {
      let (column, values) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid filter '{}', expected COLUMN=VALUE", arg))?;
      let column = column.trim();
      if column.is_empty() {
        return Err(format!("Invalid filter '{}', column name is empty", arg));
      }

      let entry = filters.entry(column.to_string()).or_default();
      entry.extend(
        values
          .split(',')
          .map(str::trim)
          .filter(|v| !v.is_empty())
          .map(String::from),
      );
    }

    filters.retain(|_, values| !values.is_empty());
    Ok(Self { filters })
  }
}

/// Response body of `GET /health`.
#[derive(Debug, Deserialize)]
pub struct ApiHealth {
  #[serde(default)]
  pub ok: bool,
}
