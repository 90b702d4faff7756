//! Owner-scoped dataset management: list, look up, rename, delete, download.
//!
//! Every dataset lives in two places (an object in the blob store and a row in
//! the metadata store) and no operation here spans both atomically. When the
//! first half succeeds and the second does not, the failure is reported as
//! `PartialFailure` so the caller knows to reconcile.

use std::{sync::Arc, time::Duration};

use tabula_core::{
  Error as CoreError,
  blob::{BlobEntry, BlobStore, DEFAULT_DOWNLOAD_TTL, DownloadRef},
  dataset::{DatasetRecord, SQLITE_CONTENT_TYPE},
  keys::{self, DEFAULT_PRIVATE_PREFIX},
  store::MetadataStore,
};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
  pub private_prefix: String,
  pub download_ttl:   Duration,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self { private_prefix: DEFAULT_PRIVATE_PREFIX.into(), download_ttl: DEFAULT_DOWNLOAD_TTL }
  }
}

pub struct Catalog<B, M> {
  blob:   Arc<B>,
  meta:   Arc<M>,
  config: Arc<CatalogConfig>,
}

impl<B, M> Clone for Catalog<B, M> {
  fn clone(&self) -> Self {
    Self { blob: self.blob.clone(), meta: self.meta.clone(), config: self.config.clone() }
  }
}

impl<B: BlobStore, M: MetadataStore> Catalog<B, M> {
  pub fn new(blob: Arc<B>, meta: Arc<M>, config: CatalogConfig) -> Self {
    Self { blob, meta, config: Arc::new(config) }
  }

  pub async fn list(&self, owner_id: &str) -> Result<Vec<DatasetRecord>> {
    self.meta.list_datasets(owner_id.to_string()).await.map_err(Error::metadata)
  }

  /// The dataset `id`, provided `owner_id` owns it.
  pub async fn get(&self, owner_id: &str, id: Uuid) -> Result<DatasetRecord> {
    let record = self
      .meta
      .get_dataset(id)
      .await
      .map_err(Error::metadata)?
      .ok_or_else(|| CoreError::NotFound(format!("dataset {id}")))?;
    if !record.is_owned_by(owner_id) {
      return Err(CoreError::PermissionDenied(format!("dataset {id} belongs to another user")).into());
    }
    Ok(record)
  }

  /// Move the object to a key with the same unique prefix and the new trailing
  /// name, then point the record at it.
  pub async fn rename(&self, owner_id: &str, id: Uuid, new_name: &str) -> Result<DatasetRecord> {
    let record = self.get(owner_id, id).await?;
    let new_name = new_name.trim();
    if new_name.is_empty() {
      return Err(CoreError::Validation("new name is empty".into()).into());
    }
    let new_name = keys::sanitize_file_name(new_name);
    // Database content keeps a `.db` key whatever its display name says.
    let key_name = if record.content_type == SQLITE_CONTENT_TYPE {
      format!("{}.db", keys::base_name(&new_name))
    } else {
      new_name.clone()
    };
    let new_key = keys::renamed_key(&record.storage_key, &key_name)?;
    if new_key == record.storage_key {
      return self.update_name_only(record, new_name).await;
    }

    let new_key = self
      .blob
      .rename(record.storage_key.clone(), new_key)
      .await
      .map_err(Error::blob)?;

    let updated = async {
      let moved = self.meta.update_storage_key(id, new_key.clone()).await?;
      let renamed = self.meta.update_name(id, new_name.clone()).await?;
      Ok::<_, M::Error>(moved && renamed)
    }
    .await;

    match updated {
      Ok(true) => {}
      Ok(false) => {
        return Err(self.partial(&record.storage_key, &new_key, "dataset record disappeared"));
      }
      Err(e) => return Err(self.partial(&record.storage_key, &new_key, &e.to_string())),
    }

    tracing::info!(dataset_id = %id, from = %record.storage_key, to = %new_key, "renamed dataset");
    Ok(DatasetRecord { name: new_name, storage_key: new_key, ..record })
  }

  async fn update_name_only(&self, record: DatasetRecord, new_name: String) -> Result<DatasetRecord> {
    self
      .meta
      .update_name(record.dataset_id, new_name.clone())
      .await
      .map_err(Error::metadata)?;
    Ok(DatasetRecord { name: new_name, ..record })
  }

  fn partial(&self, old_key: &str, new_key: &str, cause: &str) -> Error {
    tracing::warn!(from = %old_key, to = %new_key, cause, "object moved but record not updated");
    CoreError::PartialFailure(format!(
      "object moved from {old_key} to {new_key} but the dataset record was not updated: {cause}"
    ))
    .into()
  }

  /// Remove the object, then the record.
  pub async fn delete(&self, owner_id: &str, id: Uuid) -> Result<()> {
    let record = self.get(owner_id, id).await?;
    let existed = self
      .blob
      .delete(record.storage_key.clone())
      .await
      .map_err(Error::blob)?;
    if !existed {
      tracing::warn!(dataset_id = %id, key = %record.storage_key, "object already absent");
    }

    match self.meta.delete_by_storage_key(record.storage_key.clone()).await {
      Ok(_) => {
        tracing::info!(dataset_id = %id, key = %record.storage_key, "deleted dataset");
        Ok(())
      }
      Err(e) => {
        tracing::warn!(dataset_id = %id, error = %e, "object deleted but record remains");
        Err(
          CoreError::PartialFailure(format!(
            "object {} was deleted but its dataset record was not: {e}",
            record.storage_key
          ))
          .into(),
        )
      }
    }
  }

  /// A single-use, time-bounded reference to the dataset's bytes.
  pub async fn download(&self, owner_id: &str, id: Uuid) -> Result<DownloadRef> {
    let record = self.get(owner_id, id).await?;
    self
      .blob
      .download_reference(record.storage_key, self.config.download_ttl)
      .await
      .map_err(Error::blob)
  }

  /// Raw blob listing under the owner's private prefix.
  pub async fn list_objects(&self, owner_id: &str) -> Result<Vec<BlobEntry>> {
    if owner_id.is_empty() || owner_id.contains('/') {
      return Err(CoreError::Validation("invalid owner id".into()).into());
    }
    let prefix = keys::owner_prefix(&self.config.private_prefix, owner_id);
    self.blob.list(prefix).await.map_err(Error::blob)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use bytes::Bytes;
  use tabula_core::ErrorKind;
  use tabula_store_sqlite::SqliteStore;
  use tempfile::TempDir;

  use super::*;
  use crate::{
    blob::FsBlobStore,
    materialize::{Materializer, MaterializerConfig, Upload},
    testutil::FaultyMeta,
  };

  struct Fixture {
    _dir:    TempDir,
    blob:    Arc<FsBlobStore>,
    catalog: Catalog<FsBlobStore, SqliteStore>,
    mat:     Materializer<FsBlobStore, SqliteStore>,
  }

  impl Fixture {
    async fn new() -> Self {
      let dir = tempfile::tempdir().unwrap();
      let blob = Arc::new(FsBlobStore::open(dir.path().join("blobs"), "s").await.unwrap());
      let meta = Arc::new(SqliteStore::open_in_memory().await.unwrap());
      let catalog = Catalog::new(blob.clone(), meta.clone(), CatalogConfig::default());
      let mat =
        Materializer::new(blob.clone(), meta, MaterializerConfig::new(dir.path().join("scratch")));
      Self { _dir: dir, blob, catalog, mat }
    }

    async fn raw(&self, owner: &str, name: &str) -> DatasetRecord {
      let upload = Upload {
        file_name:    name.into(),
        content_type: "text/plain".into(),
        bytes:        Bytes::from_static(b"payload"),
      };
      self.mat.upload_raw(owner, upload).await.unwrap().dataset
    }
  }

  #[tokio::test]
  async fn rename_swaps_key_and_old_key_stops_resolving() {
    let f = Fixture::new().await;
    let d = f.raw("u1", "old.csv").await;
    let (dir, file) = d.storage_key.rsplit_once('/').unwrap();
    let (unique, _) = file.split_once('_').unwrap();

    let renamed = f.catalog.rename("u1", d.dataset_id, "new.csv").await.unwrap();
    assert_eq!(renamed.name, "new.csv");
    assert_eq!(renamed.storage_key, format!("{dir}/{unique}_new.csv"));
    assert_eq!(f.catalog.get("u1", d.dataset_id).await.unwrap(), renamed);

    assert!(f.blob.download_reference(d.storage_key, DEFAULT_DOWNLOAD_TTL).await.is_err());
    let reference = f.catalog.download("u1", d.dataset_id).await.unwrap();
    assert_eq!(f.blob.fetch(reference).await.unwrap(), b"payload");
  }

  #[tokio::test]
  async fn renamed_database_keeps_db_key() {
    let f = Fixture::new().await;
    let upload = Upload {
      file_name:    "staff.csv".into(),
      content_type: "text/csv".into(),
      bytes:        Bytes::from_static(b"name\nAda\n"),
    };
    let d = f.mat.ingest_csv("u1", upload, Default::default()).await.unwrap().dataset;
    assert!(d.storage_key.ends_with("_staff.db"));

    let renamed = f.catalog.rename("u1", d.dataset_id, "people.csv").await.unwrap();
    assert_eq!(renamed.name, "people.csv");
    assert_eq!(renamed.storage_key, d.storage_key.replace("_staff.db", "_people.db"));

    // Same base name: only the display name changes.
    let again = f.catalog.rename("u1", d.dataset_id, "people.sqlite").await.unwrap();
    assert_eq!(again.name, "people.sqlite");
    assert_eq!(again.storage_key, renamed.storage_key);
  }

  #[tokio::test]
  async fn foreign_owner_is_denied_and_missing_is_not_found() {
    let f = Fixture::new().await;
    let d = f.raw("u1", "a.txt").await;

    let err = f.catalog.get("u2", d.dataset_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = f.catalog.rename("u2", d.dataset_id, "b.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = f.catalog.delete("u2", d.dataset_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = f.catalog.get("u1", Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
  }

  #[tokio::test]
  async fn delete_removes_object_and_record() {
    let f = Fixture::new().await;
    let keep = f.raw("u1", "keep.txt").await;
    let gone = f.raw("u1", "gone.txt").await;

    f.catalog.delete("u1", gone.dataset_id).await.unwrap();

    let listed = f.catalog.list("u1").await.unwrap();
    assert_eq!(listed, vec![keep.clone()]);
    let objects = f.catalog.list_objects("u1").await.unwrap();
    let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec![keep.storage_key.as_str()]);
  }

  #[tokio::test]
  async fn list_objects_is_scoped_to_owner() {
    let f = Fixture::new().await;
    f.raw("u1", "a.txt").await;
    f.raw("u2", "b.txt").await;

    let mine = f.catalog.list_objects("u1").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine[0].key.starts_with("private/datasets/u1/"));
  }

  #[tokio::test]
  async fn blank_rename_is_rejected() {
    let f = Fixture::new().await;
    let d = f.raw("u1", "a.txt").await;
    let err = f.catalog.rename("u1", d.dataset_id, "  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
  }

  // ─── Half-applied operations ──────────────────────────────────────────────

  struct Faulty {
    _dir:    TempDir,
    blob:    Arc<FsBlobStore>,
    meta:    Arc<FaultyMeta>,
    catalog: Catalog<FsBlobStore, FaultyMeta>,
    record:  DatasetRecord,
  }

  impl Faulty {
    async fn new() -> Self {
      let dir = tempfile::tempdir().unwrap();
      let blob = Arc::new(FsBlobStore::open(dir.path().join("blobs"), "s").await.unwrap());
      let meta = Arc::new(FaultyMeta::open().await);
      let catalog = Catalog::new(blob.clone(), meta.clone(), CatalogConfig::default());
      let mat = Materializer::new(
        blob.clone(),
        meta.clone(),
        MaterializerConfig::new(dir.path().join("scratch")),
      );
      let upload = Upload {
        file_name:    "old.txt".into(),
        content_type: "text/plain".into(),
        bytes:        Bytes::from_static(b"payload"),
      };
      let record = mat.upload_raw("u1", upload).await.unwrap().dataset;
      Self { _dir: dir, blob, meta, catalog, record }
    }

    async fn keys(&self) -> Vec<String> {
      self.blob.list(String::new()).await.unwrap().into_iter().map(|e| e.key).collect()
    }
  }

  #[tokio::test]
  async fn rename_with_stale_record_is_partial_failure() {
    let f = Faulty::new().await;
    f.meta.fail_update_key.store(true, Ordering::SeqCst);

    let err = f.catalog.rename("u1", f.record.dataset_id, "new.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialFailure);

    // The object moved; the record still points at the old key.
    let keys = f.keys().await;
    assert_eq!(keys.len(), 1);
    assert!(keys[0].ends_with("_new.txt"));
    assert_eq!(f.catalog.get("u1", f.record.dataset_id).await.unwrap(), f.record);
  }

  #[tokio::test]
  async fn delete_with_surviving_record_is_partial_failure() {
    let f = Faulty::new().await;
    f.meta.fail_delete_by_key.store(true, Ordering::SeqCst);

    let err = f.catalog.delete("u1", f.record.dataset_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PartialFailure);
    assert!(f.keys().await.is_empty());
    assert_eq!(f.catalog.list("u1").await.unwrap(), vec![f.record.clone()]);
  }
}
