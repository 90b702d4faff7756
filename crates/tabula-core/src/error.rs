//! Error types for `tabula-core`.

use serde::Serialize;
use thiserror::Error;

/// The failure taxonomy shared by every layer.
///
/// Each crate keeps its own error enum but classifies it into one of these so
/// the HTTP boundary can pick a status without knowing the concrete source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Missing or malformed request field; user-correctable.
  Validation,
  /// Dataset or record absent.
  NotFound,
  /// Record exists but belongs to someone else.
  PermissionDenied,
  /// Blob store or oracle call failed.
  Upstream,
  /// One durable system was updated and its sibling was not.
  PartialFailure,
  /// Embedded file unreadable, malformed SQL, or no table found.
  Integrity,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("upstream failure: {0}")]
  Upstream(String),

  #[error("partial failure: {0}")]
  PartialFailure(String),

  #[error("integrity error: {0}")]
  Integrity(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) => ErrorKind::Validation,
      Error::NotFound(_) => ErrorKind::NotFound,
      Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
      Error::Upstream(_) => ErrorKind::Upstream,
      Error::PartialFailure(_) => ErrorKind::PartialFailure,
      Error::Integrity(_) | Error::Serialization(_) => ErrorKind::Integrity,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
