//! The query sandbox: time-bounded, read-only access to a stored database.
//!
//! Every operation resolves a fresh download reference, copies the object to
//! a private scratch file, opens it with `SQLITE_OPEN_READ_ONLY`, and removes
//! the copy when done. Nothing is cached between calls.
//!
//! Writes are refused twice: the read-only open makes SQLite reject DML and
//! DDL, and any prepared statement SQLite does not report as read-only
//! (`VACUUM INTO`, for one, which the read-only open still permits) is
//! rejected before it steps. Expensive queries are bounded only by
//! [`QueryLimits`].

use std::{
  path::PathBuf,
  sync::Arc,
  time::{Duration, Instant},
};

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::{
  Error as CoreError,
  blob::{BlobStore, DEFAULT_DOWNLOAD_TTL},
  keys::unique_id,
  table::{ColumnInfo, DatabaseSchema},
};

use crate::{Error, Result, db, scratch::{self, ScratchFile}};

/// SQLite VM instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueryLimits {
  /// Rows beyond this are dropped and the result marked truncated.
  pub max_rows: usize,
  /// Statements running longer than this are interrupted.
  pub timeout:  Duration,
}

impl Default for QueryLimits {
  fn default() -> Self { Self { max_rows: 10_000, timeout: Duration::from_secs(10) } }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
  pub scratch_dir:  PathBuf,
  pub download_ttl: Duration,
  pub limits:       QueryLimits,
}

impl SandboxConfig {
  pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
    Self {
      scratch_dir:  scratch_dir.into(),
      download_ttl: DEFAULT_DOWNLOAD_TTL,
      limits:       QueryLimits::default(),
    }
  }
}

/// Columns and rows of one executed statement.
///
/// `columns` is empty when no row came back. Blobs are base64 text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
  pub columns:   Vec<String>,
  pub rows:      Vec<Vec<Value>>,
  pub truncated: bool,
}

pub struct Sandbox<B> {
  blob:   Arc<B>,
  config: Arc<SandboxConfig>,
}

impl<B> Clone for Sandbox<B> {
  fn clone(&self) -> Self { Self { blob: self.blob.clone(), config: self.config.clone() } }
}

impl<B: BlobStore> Sandbox<B> {
  pub fn new(blob: Arc<B>, config: SandboxConfig) -> Self {
    Self { blob, config: Arc::new(config) }
  }

  /// List user tables (skipping `sqlite_*`) and their declared columns.
  pub async fn introspect_schema(&self, storage_key: &str) -> Result<DatabaseSchema> {
    let scratch = self.fetch_to_scratch(storage_key).await?;
    let conn = db::open_read_only(scratch.path()).await?;

    let outcome = conn
      .call(|conn| {
        let tables: Vec<String> = conn
          .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name",
          )?
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<_>>()?;

        let mut schema = DatabaseSchema::default();
        let mut stmt =
          conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        for table in tables {
          let columns = stmt
            .query_map([&table], |row| {
              Ok(ColumnInfo { name: row.get(0)?, declared_type: row.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          schema.tables.insert(table, columns);
        }
        Ok(schema)
      })
      .await;

    db::close(conn).await;
    Ok(outcome?)
  }

  /// Run exactly `sql` against the stored file and collect its rows.
  pub async fn execute(&self, storage_key: &str, sql: &str) -> Result<QueryResult> {
    if sql.trim().is_empty() {
      return Err(CoreError::Validation("query is empty".into()).into());
    }

    let scratch = self.fetch_to_scratch(storage_key).await?;
    let conn = db::open_read_only(scratch.path()).await?;
    let limits = self.config.limits;
    let sql = sql.to_string();

    let outcome = conn
      .call(move |conn| {
        let deadline = Instant::now() + limits.timeout;
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));
        Ok(collect_rows(conn, &sql, limits.max_rows)?)
      })
      .await;

    db::close(conn).await;

    match outcome {
      Ok(result) => Ok(result),
      Err(e) if is_interrupt(&e) => Err(Error::QueryTimeout(limits.timeout)),
      Err(e) => Err(e.into()),
    }
  }

  async fn fetch_to_scratch(&self, storage_key: &str) -> Result<ScratchFile> {
    let reference = self
      .blob
      .download_reference(storage_key.to_string(), self.config.download_ttl)
      .await
      .map_err(Error::blob)?;
    let bytes = self.blob.fetch(reference).await.map_err(Error::blob)?;

    scratch::ensure_dir(&self.config.scratch_dir).await?;
    let file = ScratchFile::new(&self.config.scratch_dir, &format!("{}_query.db", unique_id()));
    tokio::fs::write(file.path(), &bytes).await?;
    Ok(file)
  }
}

fn collect_rows(
  conn: &rusqlite::Connection,
  sql: &str,
  max_rows: usize,
) -> rusqlite::Result<QueryResult> {
  let mut stmt = conn.prepare(sql)?;
  if !stmt.readonly() {
    return Err(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
      Some("statement would write; only read-only statements are allowed".into()),
    ));
  }
  let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

  let mut rows = stmt.query([])?;
  let mut out = Vec::new();
  let mut truncated = false;
  while let Some(row) = rows.next()? {
    if out.len() == max_rows {
      truncated = true;
      break;
    }
    let values = (0..names.len())
      .map(|i| row.get_ref(i).map(to_json))
      .collect::<rusqlite::Result<Vec<_>>>()?;
    out.push(values);
  }

  let columns = if out.is_empty() { Vec::new() } else { names };
  Ok(QueryResult { columns, rows: out, truncated })
}

fn to_json(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::from(i),
    ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::String(B64.encode(b)),
  }
}

fn is_interrupt(err: &tokio_rusqlite::Error) -> bool {
  matches!(
    err,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == rusqlite::ErrorCode::OperationInterrupted
  )
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tabula_core::{ErrorKind, table::StorageClass};
  use tempfile::TempDir;

  use super::*;
  use crate::{blob::FsBlobStore, testutil::entries_in};

  struct Fixture {
    dir:     TempDir,
    sandbox: Sandbox<FsBlobStore>,
    blob:    Arc<FsBlobStore>,
  }

  impl Fixture {
    async fn new() -> Self {
      let dir = tempfile::tempdir().unwrap();
      let blob = Arc::new(FsBlobStore::open(dir.path().join("blobs"), "s").await.unwrap());
      let sandbox = Sandbox::new(blob.clone(), SandboxConfig::new(dir.path().join("scratch")));
      Self { dir, sandbox, blob }
    }

    /// Build a database with `ddl`, store it under `key`.
    async fn store_db(&self, key: &str, ddl: &str) {
      let path = self.dir.path().join(format!("{}.db", unique_id()));
      let conn = rusqlite::Connection::open(&path).unwrap();
      conn.execute_batch(ddl).unwrap();
      drop(conn);
      let bytes = std::fs::read(&path).unwrap();
      self.blob.put(key.into(), bytes, "application/vnd.sqlite3".into()).await.unwrap();
    }

    fn scratch_files(&self) -> usize { entries_in(self.dir.path(), "scratch") }
  }

  const USERS: &str = "
    CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, score REAL, avatar BLOB);
    INSERT INTO users (name, age, score, avatar) VALUES ('Ada', 36, 9.5, x'0102');
    INSERT INTO users (name, age, score, avatar) VALUES ('Grace', 45, NULL, NULL);
  ";

  #[tokio::test]
  async fn introspect_lists_tables_and_declared_types() {
    let f = Fixture::new().await;
    f.store_db("k/users.db", "CREATE TABLE b (x TEXT); CREATE TABLE a (id INTEGER PRIMARY KEY, v REAL);").await;

    let schema = f.sandbox.introspect_schema("k/users.db").await.unwrap();
    let names: Vec<&str> = schema.tables.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(schema.tables["a"], vec![
      ColumnInfo { name: "id".into(), declared_type: StorageClass::Integer.to_string() },
      ColumnInfo { name: "v".into(), declared_type: "REAL".into() },
    ]);
    assert_eq!(f.scratch_files(), 0);
  }

  #[tokio::test]
  async fn execute_returns_columns_and_rows() {
    let f = Fixture::new().await;
    f.store_db("k/u.db", USERS).await;

    let result = f
      .sandbox
      .execute("k/u.db", "SELECT name, age, score, avatar FROM users ORDER BY id")
      .await
      .unwrap();
    assert_eq!(result.columns, vec!["name", "age", "score", "avatar"]);
    assert_eq!(result.rows, vec![
      vec![json!("Ada"), json!(36), json!(9.5), json!("AQI=")],
      vec![json!("Grace"), json!(45), Value::Null, Value::Null],
    ]);
    assert!(!result.truncated);
    assert_eq!(f.scratch_files(), 0);
  }

  #[tokio::test]
  async fn zero_rows_means_no_columns() {
    let f = Fixture::new().await;
    f.store_db("k/u.db", USERS).await;

    let result = f.sandbox.execute("k/u.db", "SELECT * FROM users WHERE age > 100").await.unwrap();
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
  }

  #[tokio::test]
  async fn mutating_statements_fail_in_the_engine() {
    let f = Fixture::new().await;
    f.store_db("k/u.db", USERS).await;

    for sql in [
      "INSERT INTO users (name) VALUES ('Eve')",
      "UPDATE users SET age = 0",
      "DELETE FROM users",
      "DROP TABLE users",
    ] {
      let err = f.sandbox.execute("k/u.db", sql).await.unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Integrity, "{sql}");
    }

    let count = f.sandbox.execute("k/u.db", "SELECT COUNT(*) FROM users").await.unwrap();
    assert_eq!(count.rows, vec![vec![json!(2)]]);
    assert_eq!(f.scratch_files(), 0);
  }

  #[tokio::test]
  async fn vacuum_into_cannot_write_outside_scratch() {
    let f = Fixture::new().await;
    f.store_db("k/u.db", USERS).await;
    let target = f.dir.path().join("escaped.db");

    let sql = format!("VACUUM INTO '{}'", target.display());
    let err = f.sandbox.execute("k/u.db", &sql).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(!target.exists());

    let err = f.sandbox.execute("k/u.db", "VACUUM").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(f.scratch_files(), 0);
  }

  #[tokio::test]
  async fn rows_beyond_cap_are_truncated() {
    let mut f = Fixture::new().await;
    f.sandbox = Sandbox::new(f.blob.clone(), SandboxConfig {
      limits: QueryLimits { max_rows: 3, timeout: Duration::from_secs(5) },
      ..SandboxConfig::new(f.dir.path().join("scratch"))
    });
    f.store_db("k/n.db", "CREATE TABLE n (v INTEGER);
      WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10)
      INSERT INTO n SELECT x FROM c;").await;

    let result = f.sandbox.execute("k/n.db", "SELECT v FROM n ORDER BY v").await.unwrap();
    assert_eq!(result.rows.len(), 3);
    assert!(result.truncated);
  }

  #[tokio::test]
  async fn runaway_query_is_interrupted() {
    let mut f = Fixture::new().await;
    f.sandbox = Sandbox::new(f.blob.clone(), SandboxConfig {
      limits: QueryLimits { max_rows: 10, timeout: Duration::from_millis(50) },
      ..SandboxConfig::new(f.dir.path().join("scratch"))
    });
    f.store_db("k/e.db", "CREATE TABLE e (x);").await;

    let err = f
      .sandbox
      .execute(
        "k/e.db",
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT MAX(x) FROM c",
      )
      .await
      .unwrap_err();
    assert!(matches!(err, Error::QueryTimeout(_)));
  }

  #[tokio::test]
  async fn missing_object_is_upstream_failure() {
    let f = Fixture::new().await;
    let err = f.sandbox.execute("k/missing.db", "SELECT 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
  }

  #[tokio::test]
  async fn non_database_file_is_integrity_error() {
    let f = Fixture::new().await;
    f.blob.put("k/junk.db".into(), b"definitely not sqlite".repeat(64), "x".into()).await.unwrap();

    let err = f.sandbox.introspect_schema("k/junk.db").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(f.scratch_files(), 0);
  }
}
