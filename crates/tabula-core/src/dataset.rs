//! Dataset records — the metadata row that points at a durable blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content type of every generated embedded database file.
pub const SQLITE_CONTENT_TYPE: &str = "application/vnd.sqlite3";

/// The 16-byte signature every SQLite database file starts with.
pub const SQLITE_SIGNATURE: &[u8] = b"SQLite format 3\0";

/// A persisted dataset. `storage_key` is replaced wholesale on rename, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
  pub dataset_id:   Uuid,
  pub name:         String,
  pub storage_key:  String,
  pub owner_id:     String,
  pub content_type: String,
  pub byte_size:    u64,
  pub created_at:   DateTime<Utc>,
}

impl DatasetRecord {
  pub fn is_owned_by(&self, owner_id: &str) -> bool { self.owner_id == owner_id }
}

/// Input to [`crate::store::MetadataStore::create_dataset`]; id and
/// timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDataset {
  pub name:         String,
  pub storage_key:  String,
  pub owner_id:     String,
  pub content_type: String,
  pub byte_size:    u64,
}

/// How an upload is handled, decided from its declared MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
  Csv,
  Json,
  /// A pre-built SQLite file, signature-checked and stored verbatim.
  Sqlite,
  /// Anything else (XLSX included) is stored verbatim without ingestion.
  Raw,
}

impl SourceFormat {
  pub fn from_content_type(content_type: &str) -> Self {
    let essence = content_type
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();
    match essence.as_str() {
      "text/csv" | "application/csv" => SourceFormat::Csv,
      "application/json" | "text/json" => SourceFormat::Json,
      "application/vnd.sqlite3" | "application/x-sqlite3" => SourceFormat::Sqlite,
      _ => SourceFormat::Raw,
    }
  }
}

pub fn has_sqlite_signature(bytes: &[u8]) -> bool { bytes.starts_with(SQLITE_SIGNATURE) }
