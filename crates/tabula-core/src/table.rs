//! Table and column definitions, and the introspected schema shape.
//!
//! A [`TableDef`] is what the ingestion pipeline materialises; a
//! [`DatabaseSchema`] is what the query sandbox reads back out of a file.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Storage class ───────────────────────────────────────────────────────────

/// Embedded-database column type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageClass {
  #[serde(alias = "text")]
  Text,
  #[serde(alias = "integer")]
  Integer,
  #[serde(alias = "real")]
  Real,
  #[serde(alias = "blob")]
  Blob,
  #[serde(alias = "null")]
  Null,
}

impl StorageClass {
  pub fn as_str(self) -> &'static str {
    match self {
      StorageClass::Text => "TEXT",
      StorageClass::Integer => "INTEGER",
      StorageClass::Real => "REAL",
      StorageClass::Blob => "BLOB",
      StorageClass::Null => "NULL",
    }
  }

  /// The type name written into `CREATE TABLE`.
  ///
  /// `NULL` is a column-constraint keyword in SQLite, so a NULL-class column
  /// is declared without a type (no affinity).
  pub fn declared_type(self) -> &'static str {
    match self {
      StorageClass::Null => "",
      other => other.as_str(),
    }
  }
}

impl fmt::Display for StorageClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Column ──────────────────────────────────────────────────────────────────

/// A column default. String defaults are the only ones quoted in DDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
  Integer(i64),
  Real(f64),
  Text(String),
}

impl DefaultValue {
  pub fn to_sql_literal(&self) -> String {
    match self {
      DefaultValue::Integer(i) => i.to_string(),
      DefaultValue::Real(r) => r.to_string(),
      DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
  pub name:        String,
  #[serde(rename = "type")]
  pub storage:     StorageClass,
  #[serde(default)]
  pub primary_key: bool,
  #[serde(default)]
  pub not_null:    bool,
  #[serde(default)]
  pub unique:      bool,
  #[serde(default)]
  pub default:     Option<DefaultValue>,
}

impl ColumnDef {
  pub fn new(name: impl Into<String>, storage: StorageClass) -> Self {
    Self {
      name: name.into(),
      storage,
      primary_key: false,
      not_null: false,
      unique: false,
      default: None,
    }
  }

  /// The synthetic `id INTEGER PRIMARY KEY` every inferred table starts with.
  pub fn synthetic_id() -> Self {
    Self::new(ID_COLUMN, StorageClass::Integer).primary_key()
  }

  pub fn primary_key(mut self) -> Self {
    self.primary_key = true;
    self
  }

  pub fn not_null(mut self) -> Self {
    self.not_null = true;
    self
  }

  pub fn unique(mut self) -> Self {
    self.unique = true;
    self
  }

  pub fn with_default(mut self, default: DefaultValue) -> Self {
    self.default = Some(default);
    self
  }

  /// Column clause for `CREATE TABLE`, e.g. `"age" INTEGER NOT NULL`.
  pub fn to_sql(&self) -> String {
    let mut sql = quote_ident(&self.name);
    let ty = self.storage.declared_type();
    if !ty.is_empty() {
      sql.push(' ');
      sql.push_str(ty);
    }
    if self.primary_key {
      sql.push_str(" PRIMARY KEY");
    }
    if self.not_null {
      sql.push_str(" NOT NULL");
    }
    if self.unique {
      sql.push_str(" UNIQUE");
    }
    if let Some(default) = &self.default {
      sql.push_str(" DEFAULT ");
      sql.push_str(&default.to_sql_literal());
    }
    sql
  }
}

/// Name of the database-assigned primary key column.
pub const ID_COLUMN: &str = "id";

// ─── Table ───────────────────────────────────────────────────────────────────

/// A table to materialise. Column order is physical column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
  pub name:    String,
  pub columns: Vec<ColumnDef>,
}

impl TableDef {
  /// Explicit mode: the caller declares every column up front.
  pub fn explicit(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
    Self { name: name.into(), columns }
  }

  /// Reject definitions SQLite would refuse or that break column uniqueness.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("table name is empty".into()));
    }
    if self.columns.is_empty() {
      return Err(Error::Validation(format!("table {:?} has no columns", self.name)));
    }
    let mut seen = std::collections::HashSet::new();
    for col in &self.columns {
      if col.name.trim().is_empty() {
        return Err(Error::Validation(format!("table {:?} has an unnamed column", self.name)));
      }
      if !seen.insert(col.name.to_ascii_lowercase()) {
        return Err(Error::Validation(format!(
          "duplicate column {:?} in table {:?}",
          col.name, self.name
        )));
      }
    }
    if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
      return Err(Error::Validation(format!(
        "table {:?} declares more than one primary key column",
        self.name
      )));
    }
    Ok(())
  }

  pub fn create_sql(&self) -> String {
    let cols: Vec<String> = self.columns.iter().map(ColumnDef::to_sql).collect();
    format!(
      "CREATE TABLE IF NOT EXISTS {} ({})",
      quote_ident(&self.name),
      cols.join(", ")
    )
  }
}

/// Double-quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

// ─── Introspected schema ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
  pub name:          String,
  pub declared_type: String,
}

/// Table name to its columns, as discovered from a materialised file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseSchema {
  pub tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl DatabaseSchema {
  pub fn is_empty(&self) -> bool { self.tables.is_empty() }
}

/// Textual rendering embedded into oracle prompts:
///
/// ```text
/// Table "users": id (INTEGER), name (TEXT)
/// ```
impl fmt::Display for DatabaseSchema {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (table, columns) in &self.tables {
      let cols: Vec<String> = columns
        .iter()
        .map(|c| {
          if c.declared_type.is_empty() {
            c.name.clone()
          } else {
            format!("{} ({})", c.name, c.declared_type)
          }
        })
        .collect();
      writeln!(f, "Table {}: {}", quote_ident(table), cols.join(", "))?;
    }
    Ok(())
  }
}
