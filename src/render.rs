//! Plain text output for record tables.

use serde_json::Value;
use std::fmt::Write;

use crate::api::types::Record;

/// Widest a column is allowed to get before cells are truncated
const MAX_COLUMN_WIDTH: usize = 40;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Header label for a record field: `end_client` -> `END CLIENT`.
pub fn header_label(field: &str) -> String {
  field.replace('_', " ").to_uppercase()
}

/// Display form of a cell; null shows as empty.
pub fn cell_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Render records as an aligned table.
///
/// Columns come from the keys of the first record.
pub fn table(rows: &[Record]) -> String {
  let Some(first) = rows.first() else {
    return "No records found.\n".to_string();
  };

  let columns: Vec<&String> = first.keys().collect();
  let headers: Vec<String> = columns.iter().map(|c| header_label(c)).collect();
  let cells: Vec<Vec<String>> = rows
    .iter()
    .map(|row| {
      columns
        .iter()
        .map(|c| {
          let text = row.get(c.as_str()).map(cell_text).unwrap_or_default();
          truncate(&text.replace('\n', " "), MAX_COLUMN_WIDTH)
        })
        .collect()
    })
    .collect();

  let widths: Vec<usize> = (0..columns.len())
    .map(|i| {
      cells
        .iter()
        .map(|row| row[i].chars().count())
        .chain(std::iter::once(headers[i].chars().count()))
        .max()
        .unwrap_or(0)
    })
    .collect();

  let mut out = String::new();
  write_line(&mut out, &headers, &widths);
  let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
  write_line(&mut out, &rule, &widths);
  for row in &cells {
    write_line(&mut out, row, &widths);
  }
  out
}

fn write_line(out: &mut String, cells: &[String], widths: &[usize]) {
  let line = cells
    .iter()
    .zip(widths)
    .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
    .collect::<Vec<_>>()
    .join("  ");
  let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::record;
  use serde_json::json;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("ééééééé", 5), "éé...");
  }

  #[test]
  fn test_header_label() {
    assert_eq!(header_label("email_datetime_est"), "EMAIL DATETIME EST");
  }

  #[test]
  fn test_cell_text() {
    assert_eq!(cell_text(&json!(null)), "");
    assert_eq!(cell_text(&json!("Rust")), "Rust");
    assert_eq!(cell_text(&json!(42)), "42");
  }

  #[test]
  fn test_empty_table() {
    assert_eq!(table(&[]), "No records found.\n");
  }

  #[test]
  fn test_table_layout() {
    let rows = vec![
      record(json!({"candidate_name": "Ada", "task_status": null})),
      record(json!({"candidate_name": "Grace Hopper", "task_status": "done"})),
    ];

    let expected = "\
CANDIDATE NAME  TASK STATUS
--------------  -----------
Ada
Grace Hopper    done
";
    assert_eq!(table(&rows), expected);
  }

  #[test]
  fn test_columns_keep_server_order() {
    let rows: Vec<Record> =
      serde_json::from_str(r#"[{"zeta": "z", "alpha": "a", "mid": 1}]"#).unwrap();

    let header = table(&rows).lines().next().unwrap().to_string();
    assert_eq!(header, "ZETA  ALPHA  MID");
  }
}
