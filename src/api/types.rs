use serde::{Deserialize, Serialize};

/// One record as returned by the API: field name to scalar value.
///
/// The schema is open; columns are whatever keys the server sends.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One page of lookup results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
  pub rows: Vec<Record>,
  /// Total matching records across all pages
  pub total: u64,
}

impl ResultPage {
  pub fn new(rows: Vec<Record>, total: u64) -> Self {
    Self { rows, total }
  }
}

/// Build a record from a JSON object literal.
#[cfg(test)]
pub fn record(value: serde_json::Value) -> Record {
  match value {
    serde_json::Value::Object(map) => map,
    other => panic!("expected a JSON object, got {}", other),
  }
}
