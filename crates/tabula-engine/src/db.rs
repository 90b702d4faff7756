//! Connection helpers shared by the pipeline and the sandbox.

use std::path::Path;

use rusqlite::OpenFlags;

use crate::Result;

/// Open a file strictly read-only. Any write fails inside SQLite itself.
pub async fn open_read_only(path: &Path) -> Result<tokio_rusqlite::Connection> {
  let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
  Ok(tokio_rusqlite::Connection::open_with_flags(path, flags).await?)
}

/// Close a connection, logging rather than returning a failure.
pub async fn close(conn: tokio_rusqlite::Connection) {
  if let Err(e) = conn.close().await {
    tracing::warn!(error = %e, "failed to close sqlite connection");
  }
}
