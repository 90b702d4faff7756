//! Turn uploaded CSV and JSON bytes into an [`IngestPlan`].

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tabula_core::{
  Error as CoreError, Record,
  infer::infer_table,
  table::{ColumnDef, ID_COLUMN, StorageClass, TableDef},
};

use crate::{Result, pipeline::IngestPlan};

/// Options for CSV intake.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvOptions {
  /// Table name; defaults to the upload's base name.
  pub table:   Option<String>,
  /// Declared columns. Without them every header becomes a TEXT column
  /// after a synthetic `id`.
  pub columns: Option<Vec<ColumnDef>>,
}

/// Options for JSON intake. The flags are authoritative: an array uploaded
/// without `infer_types` is stored raw even though it could be inferred.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonOptions {
  pub table:       Option<String>,
  #[serde(default)]
  pub infer_types: bool,
  #[serde(default)]
  pub multi_table: bool,
}

// ─── CSV ──────────────────────────────────────────────────────────────────────

/// Parse CSV with a header row. Empty cells become NULL.
pub fn plan_csv(bytes: &[u8], table_name: String, columns: Option<Vec<ColumnDef>>) -> Result<IngestPlan> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .trim(csv::Trim::Headers)
    .from_reader(bytes);

  let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
  if headers.iter().all(String::is_empty) {
    return Err(CoreError::Validation("CSV has no header row".into()).into());
  }

  let mut records = Vec::new();
  for row in reader.records() {
    let row = row?;
    let record: Record = headers
      .iter()
      .zip(row.iter())
      .map(|(h, cell)| {
        let value = if cell.is_empty() { Value::Null } else { Value::String(cell.to_string()) };
        (h.clone(), value)
      })
      .collect();
    records.push(record);
  }

  let table = match columns {
    Some(columns) => TableDef::explicit(table_name, columns),
    None => {
      let mut cols = vec![ColumnDef::synthetic_id()];
      cols.extend(
        headers
          .iter()
          .filter(|h| h.as_str() != ID_COLUMN)
          .map(|h| ColumnDef::new(h.clone(), StorageClass::Text)),
      );
      TableDef::explicit(table_name, cols)
    }
  };
  table.validate()?;

  Ok(IngestPlan::Single { table, records })
}

// ─── JSON ─────────────────────────────────────────────────────────────────────

/// Decide the ingestion mode for a JSON payload.
///
/// - object + `multi_table`: one inferred table per array-valued key; other
///   keys are ignored.
/// - array + `infer_types`: one inferred table named `table_name`.
/// - anything else: the raw text goes into the opaque `json_data` table.
pub fn plan_json(bytes: &[u8], table_name: String, options: &JsonOptions) -> Result<IngestPlan> {
  let text = std::str::from_utf8(bytes)
    .map_err(|e| CoreError::Validation(format!("JSON upload is not UTF-8: {e}")))?;
  let value: Value = serde_json::from_str(text)?;

  match value {
    Value::Object(map) if options.multi_table => {
      let mut tables = Vec::new();
      let mut seen = HashSet::new();
      for (key, v) in map {
        let Value::Array(items) = v else {
          tracing::debug!(key = %key, "skipping non-array value in multi-table JSON");
          continue;
        };
        // SQLite folds ASCII case in table names.
        if !seen.insert(key.to_ascii_lowercase()) {
          return Err(
            CoreError::Validation(format!("table name {key:?} differs from another only by case"))
              .into(),
          );
        }
        let records = to_records(&key, items)?;
        let table = match records.first() {
          Some(first) => infer_table(key, first),
          None => infer_table(key, &Record::new()),
        };
        tables.push((table, records));
      }
      if tables.is_empty() {
        return Err(
          CoreError::Validation("JSON object has no array values to turn into tables".into())
            .into(),
        );
      }
      Ok(IngestPlan::Multi { tables })
    }
    Value::Array(items) if options.infer_types => {
      Ok(IngestPlan::inferred(table_name.clone(), to_records(&table_name, items)?))
    }
    _ => Ok(IngestPlan::Raw { payload: text.to_string() }),
  }
}

fn to_records(table: &str, items: Vec<Value>) -> Result<Vec<Record>> {
  items
    .into_iter()
    .enumerate()
    .map(|(i, item)| match item {
      Value::Object(map) => Ok(map),
      _ => Err(
        CoreError::Validation(format!("element {i} of {table:?} is not a JSON object")).into(),
      ),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn single(plan: IngestPlan) -> (TableDef, Vec<Record>) {
    match plan {
      IngestPlan::Single { table, records } => (table, records),
      other => panic!("expected single-table plan, got {other:?}"),
    }
  }

  #[test]
  fn csv_without_columns_is_all_text() {
    let csv = b"name, age\nAda,36\nGrace,\n";
    let (table, records) = single(plan_csv(csv, "people".into(), None).unwrap());

    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age"]);
    assert!(table.columns[1..].iter().all(|c| c.storage == StorageClass::Text));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["age"], Value::String("36".into()));
    assert_eq!(records[1]["age"], Value::Null);
  }

  #[test]
  fn csv_with_declared_columns_keeps_them_exactly() {
    let cols = vec![
      ColumnDef::new("Name", StorageClass::Text).not_null(),
      ColumnDef::new("Age", StorageClass::Integer),
    ];
    let (table, _) = single(plan_csv(b"Name,Age\nAda,36\n", "p".into(), Some(cols.clone())).unwrap());
    assert_eq!(table.columns, cols);
  }

  #[test]
  fn ragged_csv_is_a_parse_error() {
    let err = plan_csv(b"a,b\n1,2,3\n", "t".into(), None).unwrap_err();
    assert!(matches!(err, crate::Error::Csv(_)));
  }

  #[test]
  fn json_array_with_inference() {
    let opts = JsonOptions { infer_types: true, ..Default::default() };
    let (table, records) =
      single(plan_json(br#"[{"a":1,"b":"x"},{"a":2,"b":"y"}]"#, "t".into(), &opts).unwrap());
    assert_eq!(table.columns.len(), 3);
    assert_eq!(table.columns[1].storage, StorageClass::Integer);
    assert_eq!(records.len(), 2);
  }

  #[test]
  fn json_array_without_inference_falls_back_to_raw() {
    let plan = plan_json(br#"[{"a":1}]"#, "t".into(), &JsonOptions::default()).unwrap();
    assert!(matches!(plan, IngestPlan::Raw { payload } if payload == r#"[{"a":1}]"#));
  }

  #[test]
  fn json_object_multi_table_ignores_non_arrays() {
    let opts = JsonOptions { multi_table: true, ..Default::default() };
    let body = br#"{"users":[{"name":"a"}],"orders":[],"meta":{"v":1},"count":3}"#;
    let IngestPlan::Multi { tables } = plan_json(body, "t".into(), &opts).unwrap() else {
      panic!("expected multi-table plan");
    };
    let names: Vec<&str> = tables.iter().map(|(t, _)| t.name.as_str()).collect();
    assert_eq!(names, vec!["users", "orders"]);
    assert_eq!(tables[1].0.columns.len(), 1);
  }

  #[test]
  fn json_object_keys_differing_by_case_are_rejected() {
    let opts = JsonOptions { multi_table: true, ..Default::default() };
    let body = br#"{"Users":[{"name":"a"}],"users":[{"name":"b"}]}"#;
    let err = plan_json(body, "t".into(), &opts).unwrap_err();
    assert_eq!(err.kind(), tabula_core::ErrorKind::Validation);

    // A non-array value under a clashing key creates no table, so it is fine.
    let body = br#"{"Users":[{"name":"a"}],"users":"note"}"#;
    assert!(plan_json(body, "t".into(), &opts).is_ok());
  }

  #[test]
  fn json_array_of_scalars_is_rejected_when_inferring() {
    let opts = JsonOptions { infer_types: true, ..Default::default() };
    let err = plan_json(b"[1,2,3]", "t".into(), &opts).unwrap_err();
    assert_eq!(err.kind(), tabula_core::ErrorKind::Validation);
  }

  #[test]
  fn malformed_json_is_a_parse_error() {
    let err = plan_json(b"{not json", "t".into(), &JsonOptions::default()).unwrap_err();
    assert!(matches!(err, crate::Error::Json(_)));
  }
}
