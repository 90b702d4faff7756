//! The `BlobStore` trait: durable bytes keyed by an opaque string.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default lifetime of a download reference.
pub const DEFAULT_DOWNLOAD_TTL: Duration = Duration::from_secs(3600);

/// A time-bounded, single-use reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
  pub url:        String,
  pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
  pub key:           String,
  pub size:          u64,
  pub last_modified: DateTime<Utc>,
}

pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `bytes` under `key`, returning the key written.
  fn put(
    &self,
    key: String,
    bytes: Vec<u8>,
    content_type: String,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  fn download_reference(
    &self,
    key: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<DownloadRef, Self::Error>> + Send + '_;

  /// Resolve a reference previously handed out by
  /// [`download_reference`](Self::download_reference) to the object's bytes.
  fn fetch(
    &self,
    reference: DownloadRef,
  ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send + '_;

  /// Returns `false` if nothing was stored under `key`.
  fn delete(&self, key: String) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list(
    &self,
    prefix: String,
  ) -> impl Future<Output = Result<Vec<BlobEntry>, Self::Error>> + Send + '_;

  /// Move an object (copy then delete), returning the new key.
  fn rename(
    &self,
    old_key: String,
    new_key: String,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}
