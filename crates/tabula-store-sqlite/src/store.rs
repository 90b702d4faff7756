//! [`SqliteStore`] — the SQLite implementation of [`MetadataStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tabula_core::{
  chat::{Chat, ChatMessage, NewMessage},
  dataset::{DatasetRecord, NewDataset},
  store::MetadataStore,
};

use crate::{
  encode::{encode_dt, encode_uuid, RawChat, RawDataset, RawMessage},
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A tabula metadata store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
  matches!(
    err,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── MetadataStore impl ──────────────────────────────────────────────────────

impl MetadataStore for SqliteStore {
  type Error = Error;

  // ── Datasets ──────────────────────────────────────────────────────────────

  async fn create_dataset(&self, input: NewDataset) -> Result<DatasetRecord> {
    let record = DatasetRecord {
      dataset_id:   Uuid::new_v4(),
      name:         input.name,
      storage_key:  input.storage_key,
      owner_id:     input.owner_id,
      content_type: input.content_type,
      byte_size:    input.byte_size,
      created_at:   Utc::now(),
    };

    let id_str      = encode_uuid(record.dataset_id);
    let name        = record.name.clone();
    let key         = record.storage_key.clone();
    let owner       = record.owner_id.clone();
    let ctype       = record.content_type.clone();
    let size        = i64::try_from(record.byte_size).unwrap_or(i64::MAX);
    let created_str = encode_dt(record.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO datasets (
             dataset_id, name, storage_key, owner_id, content_type, byte_size, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, name, key, owner, ctype, size, created_str],
        )?;
        Ok(())
      })
      .await;

    match inserted {
      Ok(()) => Ok(record),
      Err(e) if is_constraint_violation(&e) => {
        Err(Error::DuplicateStorageKey(record.storage_key))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_dataset(&self, id: Uuid) -> Result<Option<DatasetRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawDataset> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM datasets WHERE dataset_id = ?1", RawDataset::COLUMNS),
            rusqlite::params![id_str],
            RawDataset::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDataset::into_record).transpose()
  }

  async fn list_datasets(&self, owner_id: String) -> Result<Vec<DatasetRecord>> {
    let raws: Vec<RawDataset> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM datasets WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
          RawDataset::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner_id], RawDataset::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDataset::into_record).collect()
  }

  async fn update_name(&self, id: Uuid, name: String) -> Result<bool> {
    let id_str = encode_uuid(id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE datasets SET name = ?1 WHERE dataset_id = ?2",
          rusqlite::params![name, id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn update_storage_key(&self, id: Uuid, storage_key: String) -> Result<bool> {
    let id_str = encode_uuid(id);
    let key    = storage_key.clone();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE datasets SET storage_key = ?1 WHERE dataset_id = ?2",
          rusqlite::params![key, id_str],
        )?)
      })
      .await;

    match changed {
      Ok(n) => Ok(n > 0),
      Err(e) if is_constraint_violation(&e) => Err(Error::DuplicateStorageKey(storage_key)),
      Err(e) => Err(e.into()),
    }
  }

  async fn delete_by_storage_key(&self, storage_key: String) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM datasets WHERE storage_key = ?1",
          rusqlite::params![storage_key],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Chats ─────────────────────────────────────────────────────────────────

  async fn create_chat(&self, dataset_id: Uuid, owner_id: String) -> Result<Chat> {
    if self.get_dataset(dataset_id).await?.is_none() {
      return Err(Error::DatasetNotFound(dataset_id));
    }

    let chat = Chat {
      chat_id: Uuid::new_v4(),
      dataset_id,
      owner_id,
      created_at: Utc::now(),
    };

    let id_str      = encode_uuid(chat.chat_id);
    let dataset_str = encode_uuid(dataset_id);
    let owner       = chat.owner_id.clone();
    let at_str      = encode_dt(chat.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO chats (chat_id, dataset_id, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, dataset_str, owner, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(chat)
  }

  async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawChat> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT chat_id, dataset_id, owner_id, created_at FROM chats WHERE chat_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawChat {
                chat_id:    row.get(0)?,
                dataset_id: row.get(1)?,
                owner_id:   row.get(2)?,
                created_at: row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawChat::into_chat).transpose()
  }

  async fn add_message(&self, input: NewMessage) -> Result<ChatMessage> {
    let message = ChatMessage {
      message_id:    Uuid::new_v4(),
      chat_id:       input.chat_id,
      role:          input.role,
      content:       input.content,
      title:         input.title,
      sql:           input.sql,
      visualization: input.visualization,
      error:         input.error,
      created_at:    Utc::now(),
    };

    let id_str    = encode_uuid(message.message_id);
    let chat_str  = encode_uuid(message.chat_id);
    let role      = message.role.as_str();
    let content   = message.content.clone();
    let title     = message.title.clone();
    let sql       = message.sql.clone();
    let vis       = message.visualization.map(|v| v.as_str());
    let error     = message.error.clone();
    let at_str    = encode_dt(message.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO messages (
             message_id, chat_id, role, content, title, sql, visualization, error, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![id_str, chat_str, role, content, title, sql, vis, error, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(message)
  }

  async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>> {
    let chat_str = encode_uuid(chat_id);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY seq",
          RawMessage::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![chat_str], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }
}
