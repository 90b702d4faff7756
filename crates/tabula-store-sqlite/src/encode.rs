//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, enums as their lowercase names.

use chrono::{DateTime, Utc};
use tabula_core::{
  chat::{Chat, ChatMessage, Role, VisualizationHint},
  dataset::DatasetRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw rows ─────────────────────────────────────────────────────────────────

/// Column values of a `datasets` row, straight out of SQLite.
pub struct RawDataset {
  pub dataset_id:   String,
  pub name:         String,
  pub storage_key:  String,
  pub owner_id:     String,
  pub content_type: String,
  pub byte_size:    i64,
  pub created_at:   String,
}

impl RawDataset {
  pub const COLUMNS: &'static str =
    "dataset_id, name, storage_key, owner_id, content_type, byte_size, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      dataset_id:   row.get(0)?,
      name:         row.get(1)?,
      storage_key:  row.get(2)?,
      owner_id:     row.get(3)?,
      content_type: row.get(4)?,
      byte_size:    row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_record(self) -> Result<DatasetRecord> {
    Ok(DatasetRecord {
      dataset_id:   decode_uuid(&self.dataset_id)?,
      name:         self.name,
      storage_key:  self.storage_key,
      owner_id:     self.owner_id,
      content_type: self.content_type,
      byte_size:    u64::try_from(self.byte_size).unwrap_or_default(),
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawChat {
  pub chat_id:    String,
  pub dataset_id: String,
  pub owner_id:   String,
  pub created_at: String,
}

impl RawChat {
  pub fn into_chat(self) -> Result<Chat> {
    Ok(Chat {
      chat_id:    decode_uuid(&self.chat_id)?,
      dataset_id: decode_uuid(&self.dataset_id)?,
      owner_id:   self.owner_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawMessage {
  pub message_id:    String,
  pub chat_id:       String,
  pub role:          String,
  pub content:       String,
  pub title:         Option<String>,
  pub sql:           Option<String>,
  pub visualization: Option<String>,
  pub error:         Option<String>,
  pub created_at:    String,
}

impl RawMessage {
  pub const COLUMNS: &'static str =
    "message_id, chat_id, role, content, title, sql, visualization, error, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:    row.get(0)?,
      chat_id:       row.get(1)?,
      role:          row.get(2)?,
      content:       row.get(3)?,
      title:         row.get(4)?,
      sql:           row.get(5)?,
      visualization: row.get(6)?,
      error:         row.get(7)?,
      created_at:    row.get(8)?,
    })
  }

  pub fn into_message(self) -> Result<ChatMessage> {
    Ok(ChatMessage {
      message_id:    decode_uuid(&self.message_id)?,
      chat_id:       decode_uuid(&self.chat_id)?,
      role:          self.role.parse::<Role>()?,
      content:       self.content,
      title:         self.title,
      sql:           self.sql,
      visualization: self
        .visualization
        .as_deref()
        .map(str::parse::<VisualizationHint>)
        .transpose()?,
      error:         self.error,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
