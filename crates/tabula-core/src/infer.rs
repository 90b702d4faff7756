//! Type inference and the inferred-mode schema builder.
//!
//! Inference is a total function: every value shape maps to exactly one
//! [`StorageClass`] and nothing here can fail.

use serde_json::Value;

use crate::{
  Record,
  table::{ColumnDef, ID_COLUMN, StorageClass, TableDef},
};

/// The closed set of shapes a decoded scalar can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
  Null,
  Integer,
  Real,
  Boolean,
  /// Raw bytes. JSON never produces this; binary-capable sources do.
  Binary,
  Text,
  /// Nested object or array. Callers serialise these to text before insert.
  Composite,
}

impl ValueShape {
  pub fn of(value: &Value) -> Self {
    match value {
      Value::Null => ValueShape::Null,
      Value::Bool(_) => ValueShape::Boolean,
      Value::Number(n) if n.is_i64() || n.is_u64() => ValueShape::Integer,
      Value::Number(n) => match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => ValueShape::Integer,
        _ => ValueShape::Real,
      },
      Value::String(_) => ValueShape::Text,
      Value::Array(_) | Value::Object(_) => ValueShape::Composite,
    }
  }

  pub fn storage_class(self) -> StorageClass {
    match self {
      ValueShape::Null => StorageClass::Null,
      ValueShape::Integer | ValueShape::Boolean => StorageClass::Integer,
      ValueShape::Real => StorageClass::Real,
      ValueShape::Binary => StorageClass::Blob,
      ValueShape::Text | ValueShape::Composite => StorageClass::Text,
    }
  }
}

pub fn infer_storage_class(value: &Value) -> StorageClass { ValueShape::of(value).storage_class() }

/// Build a table from one representative record.
///
/// The synthetic `id` primary key always comes first; the record's own `id`
/// field, if any, is dropped because the key is database-assigned.
pub fn infer_table(name: impl Into<String>, sample: &Record) -> TableDef {
  let mut columns = vec![ColumnDef::synthetic_id()];
  columns.extend(
    sample
      .iter()
      .filter(|(field, _)| field.as_str() != ID_COLUMN)
      .map(|(field, value)| ColumnDef::new(field.clone(), infer_storage_class(value))),
  );
  TableDef { name: name.into(), columns }
}
