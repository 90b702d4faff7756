//! The `MetadataStore` trait: dataset rows and chat history.
//!
//! Implemented by storage backends (e.g. `tabula-store-sqlite`). The engine
//! and server depend on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  chat::{Chat, ChatMessage, NewMessage},
  dataset::{DatasetRecord, NewDataset},
};

/// Abstraction over the metadata record store.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`). Atomicity is whatever the backend
/// guarantees per call; callers do no locking of their own.
pub trait MetadataStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Datasets ──────────────────────────────────────────────────────────

  /// Persist a new dataset row. Fails if `storage_key` is already taken.
  fn create_dataset(
    &self,
    input: NewDataset,
  ) -> impl Future<Output = Result<DatasetRecord, Self::Error>> + Send + '_;

  fn get_dataset(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<DatasetRecord>, Self::Error>> + Send + '_;

  /// All datasets owned by `owner_id`, newest first.
  fn list_datasets(
    &self,
    owner_id: String,
  ) -> impl Future<Output = Result<Vec<DatasetRecord>, Self::Error>> + Send + '_;

  /// Returns `false` when no row matched.
  fn update_name(
    &self,
    id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Replace the row's storage key. Returns `false` when no row matched.
  fn update_storage_key(
    &self,
    id: Uuid,
    storage_key: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns `false` when no row matched.
  fn delete_by_storage_key(
    &self,
    storage_key: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Chats ─────────────────────────────────────────────────────────────

  fn create_chat(
    &self,
    dataset_id: Uuid,
    owner_id: String,
  ) -> impl Future<Output = Result<Chat, Self::Error>> + Send + '_;

  fn get_chat(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Chat>, Self::Error>> + Send + '_;

  /// Append a message; the store assigns id and timestamp.
  fn add_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<ChatMessage, Self::Error>> + Send + '_;

  /// Messages of a chat in the order they were added.
  fn list_messages(
    &self,
    chat_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ChatMessage>, Self::Error>> + Send + '_;
}
