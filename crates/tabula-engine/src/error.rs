//! Error type for `tabula-engine`.

use std::time::Duration;

use tabula_core::ErrorKind;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] tabula_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv parse error: {0}")]
  Csv(#[from] csv::Error),

  #[error("json parse error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("blob store error: {0}")]
  Blob(#[source] BoxError),

  #[error("metadata store error: {0}")]
  Metadata(#[source] BoxError),

  #[error("oracle error: {0}")]
  Oracle(#[source] BoxError),

  #[error("query interrupted after {0:?}")]
  QueryTimeout(Duration),
}

impl Error {
  pub fn blob(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Blob(Box::new(e))
  }

  pub fn metadata(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Metadata(Box::new(e))
  }

  pub fn oracle(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Oracle(Box::new(e))
  }

  /// Where this failure sits in the shared taxonomy.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Csv(_) | Error::Json(_) => ErrorKind::Validation,
      Error::Blob(_) | Error::Metadata(_) | Error::Oracle(_) => ErrorKind::Upstream,
      Error::Database(_) | Error::Sqlite(_) | Error::Io(_) | Error::QueryTimeout(_) => {
        ErrorKind::Integrity
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
