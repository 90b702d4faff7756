//! The relational ingestion pipeline.
//!
//! Creates every table and inserts every row inside one transaction. The
//! transaction commits only after the last row is queued; any failure rolls
//! the whole unit back, so a failed call leaves no table and no row behind.
//! The connection is closed on both paths.
//!
//! Not idempotent: running the same plan twice re-inserts every row.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::Value;
use tabula_core::{
  Record,
  infer::infer_table,
  table::{ColumnDef, ID_COLUMN, StorageClass, TableDef, quote_ident},
};

use crate::{Result, db};

/// Table used by the raw fallback mode.
pub const RAW_TABLE: &str = "json_data";

/// What to materialise. The caller picks the mode; nothing here second-guesses
/// it.
#[derive(Debug, Clone)]
pub enum IngestPlan {
  /// One table of homogeneous records (CSV, or a JSON array with inference).
  Single { table: TableDef, records: Vec<Record> },
  /// One table per array-valued key of a JSON object.
  Multi { tables: Vec<(TableDef, Vec<Record>)> },
  /// The whole payload as a single TEXT row of [`RAW_TABLE`].
  Raw { payload: String },
}

impl IngestPlan {
  /// Infer a table from the first record and load all of them.
  pub fn inferred(name: impl Into<String>, records: Vec<Record>) -> Self {
    let table = match records.first() {
      Some(first) => infer_table(name, first),
      None => infer_table(name, &Record::new()),
    };
    IngestPlan::Single { table, records }
  }

  fn into_batches(self) -> Result<Vec<Batch>> {
    match self {
      IngestPlan::Single { table, records } => Ok(vec![Batch::new(table, &records)?]),
      IngestPlan::Multi { tables } => tables
        .into_iter()
        .map(|(table, records)| Batch::new(table, &records))
        .collect(),
      IngestPlan::Raw { payload } => {
        let table = TableDef::explicit(RAW_TABLE, vec![
          ColumnDef::synthetic_id(),
          ColumnDef::new("data", StorageClass::Text),
        ]);
        let mut record = Record::new();
        record.insert("data".into(), Value::String(payload));
        Ok(vec![Batch::new(table, &[record])?])
      }
    }
  }
}

/// Rows written per table by one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
  pub tables: Vec<TableCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
  pub table: String,
  pub rows:  usize,
}

// ─── Prepared statements ─────────────────────────────────────────────────────

/// One table's DDL plus its insert statements, fully bound before the
/// database thread sees them.
struct Batch {
  table:      String,
  create_sql: String,
  rows:       Vec<PreparedRow>,
}

struct PreparedRow {
  sql:    String,
  values: Vec<SqlValue>,
}

impl Batch {
  fn new(table: TableDef, records: &[Record]) -> Result<Self> {
    table.validate()?;
    let rows = records
      .iter()
      .map(|record| insert_for(&table.name, record))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { create_sql: table.create_sql(), table: table.name, rows })
  }
}

/// Parameterised insert covering every field of `record` except `id`.
fn insert_for(table: &str, record: &Record) -> Result<PreparedRow> {
  let fields: Vec<(&String, &Value)> =
    record.iter().filter(|(k, _)| k.as_str() != ID_COLUMN).collect();

  if fields.is_empty() {
    return Ok(PreparedRow {
      sql:    format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)),
      values: vec![],
    });
  }

  let columns: Vec<String> = fields.iter().map(|(k, _)| quote_ident(k)).collect();
  let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
  let values = fields
    .iter()
    .map(|(_, v)| to_sql_value(v))
    .collect::<Result<Vec<_>>>()?;

  Ok(PreparedRow {
    sql: format!(
      "INSERT INTO {} ({}) VALUES ({})",
      quote_ident(table),
      columns.join(", "),
      placeholders.join(", ")
    ),
    values,
  })
}

/// Scalars bind natively; nested structures degrade to their JSON text.
fn to_sql_value(value: &Value) -> Result<SqlValue> {
  Ok(match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    Value::Array(_) | Value::Object(_) => SqlValue::Text(serde_json::to_string(value)?),
  })
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// Materialise `plan` into the SQLite file at `path`, creating it if needed.
pub async fn ingest(path: &Path, plan: IngestPlan) -> Result<IngestSummary> {
  let batches = plan.into_batches()?;
  let conn = tokio_rusqlite::Connection::open(path).await?;

  let outcome = conn
    .call(move |conn| {
      let tx = conn.transaction()?;
      for batch in &batches {
        tx.execute(&batch.create_sql, [])?;
      }
      let mut counts = Vec::with_capacity(batches.len());
      for batch in &batches {
        for row in &batch.rows {
          let mut stmt = tx.prepare_cached(&row.sql)?;
          stmt.execute(rusqlite::params_from_iter(row.values.iter()))?;
        }
        counts.push(TableCount { table: batch.table.clone(), rows: batch.rows.len() });
      }
      // Dropping `tx` on any early return above rolls everything back.
      tx.commit()?;
      Ok(counts)
    })
    .await;

  db::close(conn).await;

  let tables = outcome?;
  for count in &tables {
    tracing::debug!(table = %count.table, rows = count.rows, "ingested table");
  }
  Ok(IngestSummary { tables })
}
