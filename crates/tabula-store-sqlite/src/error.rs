//! Error type for `tabula-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tabula_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("dataset not found: {0}")]
  DatasetNotFound(uuid::Uuid),

  #[error("storage key already in use: {0}")]
  DuplicateStorageKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
