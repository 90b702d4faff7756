//! Shared fixtures for engine tests.

use std::{
  path::Path,
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use tabula_core::{
  blob::{BlobEntry, BlobStore, DownloadRef},
  chat::{Chat, ChatMessage, NewMessage},
  dataset::{DatasetRecord, NewDataset},
  store::MetadataStore,
};
use tabula_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::blob::{BlobError, FsBlobStore};

/// Entries directly inside `dir/sub`; zero when it does not exist.
pub fn entries_in(dir: &Path, sub: &str) -> usize {
  std::fs::read_dir(dir.join(sub)).map(|rd| rd.count()).unwrap_or(0)
}

// ─── Failure injection ────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Fault {
  #[error("injected failure in {0}")]
  Injected(&'static str),
  #[error(transparent)]
  Blob(#[from] BlobError),
  #[error(transparent)]
  Store(#[from] tabula_store_sqlite::Error),
}

fn trip(flag: &AtomicBool, op: &'static str) -> Result<(), Fault> {
  if flag.load(Ordering::SeqCst) { Err(Fault::Injected(op)) } else { Ok(()) }
}

/// A [`SqliteStore`] whose dataset writes can be made to fail on demand.
pub struct FaultyMeta {
  inner:                  SqliteStore,
  pub fail_create:        AtomicBool,
  pub fail_update_key:    AtomicBool,
  pub fail_delete_by_key: AtomicBool,
}

impl FaultyMeta {
  pub async fn open() -> Self {
    Self {
      inner:              SqliteStore::open_in_memory().await.unwrap(),
      fail_create:        AtomicBool::new(false),
      fail_update_key:    AtomicBool::new(false),
      fail_delete_by_key: AtomicBool::new(false),
    }
  }
}

impl MetadataStore for FaultyMeta {
  type Error = Fault;

  async fn create_dataset(&self, input: NewDataset) -> Result<DatasetRecord, Fault> {
    trip(&self.fail_create, "create_dataset")?;
    Ok(self.inner.create_dataset(input).await?)
  }

  async fn get_dataset(&self, id: Uuid) -> Result<Option<DatasetRecord>, Fault> {
    Ok(self.inner.get_dataset(id).await?)
  }

  async fn list_datasets(&self, owner_id: String) -> Result<Vec<DatasetRecord>, Fault> {
    Ok(self.inner.list_datasets(owner_id).await?)
  }

  async fn update_name(&self, id: Uuid, name: String) -> Result<bool, Fault> {
    Ok(self.inner.update_name(id, name).await?)
  }

  async fn update_storage_key(&self, id: Uuid, storage_key: String) -> Result<bool, Fault> {
    trip(&self.fail_update_key, "update_storage_key")?;
    Ok(self.inner.update_storage_key(id, storage_key).await?)
  }

  async fn delete_by_storage_key(&self, storage_key: String) -> Result<bool, Fault> {
    trip(&self.fail_delete_by_key, "delete_by_storage_key")?;
    Ok(self.inner.delete_by_storage_key(storage_key).await?)
  }

  async fn create_chat(&self, dataset_id: Uuid, owner_id: String) -> Result<Chat, Fault> {
    Ok(self.inner.create_chat(dataset_id, owner_id).await?)
  }

  async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, Fault> {
    Ok(self.inner.get_chat(id).await?)
  }

  async fn add_message(&self, input: NewMessage) -> Result<ChatMessage, Fault> {
    Ok(self.inner.add_message(input).await?)
  }

  async fn list_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>, Fault> {
    Ok(self.inner.list_messages(chat_id).await?)
  }
}

/// An [`FsBlobStore`] whose deletes can be made to fail on demand.
pub struct FaultyBlob {
  inner:           FsBlobStore,
  pub fail_delete: AtomicBool,
}

impl FaultyBlob {
  pub async fn open(root: &Path) -> Self {
    Self { inner: FsBlobStore::open(root, "s").await.unwrap(), fail_delete: AtomicBool::new(false) }
  }
}

impl BlobStore for FaultyBlob {
  type Error = Fault;

  async fn put(&self, key: String, bytes: Vec<u8>, content_type: String) -> Result<String, Fault> {
    Ok(self.inner.put(key, bytes, content_type).await?)
  }

  async fn download_reference(&self, key: String, ttl: Duration) -> Result<DownloadRef, Fault> {
    Ok(self.inner.download_reference(key, ttl).await?)
  }

  async fn fetch(&self, reference: DownloadRef) -> Result<Vec<u8>, Fault> {
    Ok(self.inner.fetch(reference).await?)
  }

  async fn delete(&self, key: String) -> Result<bool, Fault> {
    trip(&self.fail_delete, "delete")?;
    Ok(self.inner.delete(key).await?)
  }

  async fn list(&self, prefix: String) -> Result<Vec<BlobEntry>, Fault> {
    Ok(self.inner.list(prefix).await?)
  }

  async fn rename(&self, old_key: String, new_key: String) -> Result<String, Fault> {
    Ok(self.inner.rename(old_key, new_key).await?)
  }
}
