//! [`FsBlobStore`] — a [`BlobStore`] rooted at a local directory.
//!
//! Keys map to relative paths under the root. Download references look like
//! `blob:///<key>?expires=<unix>&sig=<hex>` where the signature is
//! SHA-256 over the store secret, the key and the expiry. A reference can be
//! fetched once, before it expires.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tabula_core::blob::{BlobEntry, BlobStore, DownloadRef};
use thiserror::Error;

const SCHEME: &str = "blob:///";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("invalid key: {0:?}")]
  InvalidKey(String),

  #[error("object not found: {0}")]
  NotFound(String),

  #[error("malformed download reference")]
  MalformedReference,

  #[error("download reference signature mismatch")]
  BadSignature,

  #[error("download reference expired")]
  Expired,

  #[error("download reference already used")]
  AlreadyUsed,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = BlobError> = std::result::Result<T, E>;

/// Cloning is cheap; clones share the consumed-reference ledger.
#[derive(Clone)]
pub struct FsBlobStore {
  root:     PathBuf,
  secret:   Arc<Vec<u8>>,
  /// Signature → expiry of every reference already fetched.
  consumed: Arc<Mutex<HashMap<String, i64>>>,
}

impl FsBlobStore {
  pub async fn open(root: impl Into<PathBuf>, secret: impl AsRef<[u8]>) -> Result<Self> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await?;
    Ok(Self {
      root,
      secret: Arc::new(secret.as_ref().to_vec()),
      consumed: Arc::default(),
    })
  }

  fn path_for(&self, key: &str) -> Result<PathBuf> {
    let valid = !key.is_empty()
      && !key.starts_with('/')
      && !key.contains('\\')
      && !key.ends_with(PARTIAL_SUFFIX)
      && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if !valid {
      return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(self.root.join(key))
  }

  fn sign(&self, key: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.secret.as_slice());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(expires.to_le_bytes());
    hex::encode(hasher.finalize())
  }

  /// Record `sig` as used. Also forgets references that have expired anyway.
  fn consume(&self, sig: &str, expires: i64, now: i64) -> Result<()> {
    let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
    consumed.retain(|_, exp| *exp >= now);
    if consumed.insert(sig.to_string(), expires).is_some() {
      return Err(BlobError::AlreadyUsed);
    }
    Ok(())
  }

  async fn require_file(path: &Path, key: &str) -> Result<std::fs::Metadata> {
    match tokio::fs::metadata(path).await {
      Ok(m) if m.is_file() => Ok(m),
      Ok(_) => Err(BlobError::NotFound(key.to_string())),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(key.to_string()))
      }
      Err(e) => Err(e.into()),
    }
  }
}

/// Split a reference URL into `(key, expires, sig)`.
fn parse_reference(url: &str) -> Result<(&str, i64, &str)> {
  let rest = url.strip_prefix(SCHEME).ok_or(BlobError::MalformedReference)?;
  let (key, query) = rest.rsplit_once('?').ok_or(BlobError::MalformedReference)?;
  let mut expires = None;
  let mut sig = None;
  for pair in query.split('&') {
    match pair.split_once('=') {
      Some(("expires", v)) => expires = v.parse::<i64>().ok(),
      Some(("sig", v)) => sig = Some(v),
      _ => return Err(BlobError::MalformedReference),
    }
  }
  match (expires, sig) {
    (Some(expires), Some(sig)) => Ok((key, expires, sig)),
    _ => Err(BlobError::MalformedReference),
  }
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
  meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

impl BlobStore for FsBlobStore {
  type Error = BlobError;

  async fn put(&self, key: String, bytes: Vec<u8>, content_type: String) -> Result<String> {
    let path = self.path_for(&key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    // Write beside the target, then rename into place.
    let mut partial = path.clone().into_os_string();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, &path).await?;
    tracing::debug!(key = %key, bytes = bytes.len(), content_type = %content_type, "stored object");
    Ok(key)
  }

  async fn download_reference(&self, key: String, ttl: Duration) -> Result<DownloadRef> {
    let path = self.path_for(&key)?;
    Self::require_file(&path, &key).await?;

    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let expires = Utc::now().timestamp().saturating_add(ttl_secs);
    let expires_at =
      DateTime::<Utc>::from_timestamp(expires, 0).ok_or(BlobError::MalformedReference)?;
    let sig = self.sign(&key, expires);

    Ok(DownloadRef { url: format!("{SCHEME}{key}?expires={expires}&sig={sig}"), expires_at })
  }

  async fn fetch(&self, reference: DownloadRef) -> Result<Vec<u8>> {
    let (key, expires, sig) = parse_reference(&reference.url)?;
    if self.sign(key, expires) != sig {
      return Err(BlobError::BadSignature);
    }
    let now = Utc::now().timestamp();
    if expires < now {
      return Err(BlobError::Expired);
    }
    self.consume(sig, expires, now)?;

    let path = self.path_for(key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(key.to_string()))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn delete(&self, key: String) -> Result<bool> {
    let path = self.path_for(&key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  async fn list(&self, prefix: String) -> Result<Vec<BlobEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![self.root.clone()];

    while let Some(dir) = pending.pop() {
      let mut rd = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(e.into()),
      };
      while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let meta = entry.metadata().await?;
        if meta.is_dir() {
          pending.push(path);
          continue;
        }
        let Ok(rel) = path.strip_prefix(&self.root) else { continue };
        let key: Vec<String> = rel
          .components()
          .map(|c| c.as_os_str().to_string_lossy().into_owned())
          .collect();
        let key = key.join("/");
        if key.ends_with(PARTIAL_SUFFIX) || !key.starts_with(&prefix) {
          continue;
        }
        entries.push(BlobEntry { key, size: meta.len(), last_modified: modified_at(&meta) });
      }
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
  }

  async fn rename(&self, old_key: String, new_key: String) -> Result<String> {
    let from = self.path_for(&old_key)?;
    let to = self.path_for(&new_key)?;
    Self::require_file(&from, &old_key).await?;
    if let Some(parent) = to.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(&from, &to).await?;
    tokio::fs::remove_file(&from).await?;
    Ok(new_key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  async fn store(dir: &TempDir) -> FsBlobStore {
    FsBlobStore::open(dir.path().join("blobs"), "test-secret").await.unwrap()
  }

  const TTL: Duration = Duration::from_secs(60);

  #[tokio::test]
  async fn put_then_fetch_once() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    let key = "private/datasets/u1/abc_a.db".to_string();
    s.put(key.clone(), b"hello".to_vec(), "application/octet-stream".into()).await.unwrap();

    let reference = s.download_reference(key, TTL).await.unwrap();
    assert_eq!(s.fetch(reference.clone()).await.unwrap(), b"hello");
    assert!(matches!(s.fetch(reference).await, Err(BlobError::AlreadyUsed)));
  }

  #[tokio::test]
  async fn tampered_reference_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    s.put("a/b".into(), b"x".to_vec(), "text/plain".into()).await.unwrap();
    s.put("a/c".into(), b"y".to_vec(), "text/plain".into()).await.unwrap();

    let mut reference = s.download_reference("a/b".into(), TTL).await.unwrap();
    reference.url = reference.url.replace("a/b", "a/c");
    assert!(matches!(s.fetch(reference).await, Err(BlobError::BadSignature)));
  }

  #[tokio::test]
  async fn expired_reference_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    s.put("k".into(), b"x".to_vec(), "text/plain".into()).await.unwrap();

    let expires = Utc::now().timestamp() - 10;
    let reference = DownloadRef {
      url:        format!("{SCHEME}k?expires={expires}&sig={}", s.sign("k", expires)),
      expires_at: Utc::now(),
    };
    assert!(matches!(s.fetch(reference).await, Err(BlobError::Expired)));
  }

  #[tokio::test]
  async fn reference_for_missing_key_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    let err = s.download_reference("nope".into(), TTL).await.unwrap_err();
    assert!(matches!(err, BlobError::NotFound(_)));
  }

  #[tokio::test]
  async fn traversal_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    for key in ["../escape", "/abs", "a//b", "a/./b", ""] {
      let err = s.put(key.into(), vec![], "x".into()).await.unwrap_err();
      assert!(matches!(err, BlobError::InvalidKey(_)), "{key:?}");
    }
  }

  #[tokio::test]
  async fn rename_moves_object() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    let old = "private/datasets/u1/abc_old.csv".to_string();
    let new = "private/datasets/u1/abc_new.csv".to_string();
    s.put(old.clone(), b"data".to_vec(), "text/csv".into()).await.unwrap();

    assert_eq!(s.rename(old.clone(), new.clone()).await.unwrap(), new);
    assert!(matches!(
      s.download_reference(old, TTL).await,
      Err(BlobError::NotFound(_))
    ));
    let reference = s.download_reference(new, TTL).await.unwrap();
    assert_eq!(s.fetch(reference).await.unwrap(), b"data");
  }

  #[tokio::test]
  async fn list_filters_by_prefix_and_delete_reports_presence() {
    let dir = tempfile::tempdir().unwrap();
    let s = store(&dir).await;
    s.put("p/u1/a_1.db".into(), b"1".to_vec(), "x".into()).await.unwrap();
    s.put("p/u1/b_2.db".into(), b"22".to_vec(), "x".into()).await.unwrap();
    s.put("p/u2/c_3.db".into(), b"333".to_vec(), "x".into()).await.unwrap();

    let listed = s.list("p/u1/".into()).await.unwrap();
    let keys: Vec<&str> = listed.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["p/u1/a_1.db", "p/u1/b_2.db"]);
    assert_eq!(listed[1].size, 2);

    assert!(s.delete("p/u1/a_1.db".into()).await.unwrap());
    assert!(!s.delete("p/u1/a_1.db".into()).await.unwrap());
    assert_eq!(s.list("p/u1/".into()).await.unwrap().len(), 1);
  }
}
