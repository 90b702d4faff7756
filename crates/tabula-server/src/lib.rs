//! JSON API for tabula.
//!
//! Exposes an axum [`Router`] over the engine: dataset upload and management,
//! direct queries, and question/answer chats. Caller identity comes from the
//! `x-owner-id` header; authentication is the gateway's job.

pub mod chat;
pub mod datasets;
pub mod error;
pub mod owner;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use serde::Deserialize;
use tabula_core::{blob::BlobStore, keys::DEFAULT_PRIVATE_PREFIX, oracle::Oracle, store::MetadataStore};
use tabula_engine::{
  catalog::{Catalog, CatalogConfig},
  conversation::Conversation,
  materialize::{Materializer, MaterializerConfig},
  oracle::OracleConfig,
  sandbox::{QueryLimits, Sandbox, SandboxConfig},
};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TABULA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub metadata_path:     PathBuf,
  pub blob_root:         PathBuf,
  pub blob_secret:       String,
  pub scratch_dir:       PathBuf,
  pub private_prefix:    String,
  pub download_ttl_secs: u64,
  pub max_upload_bytes:  usize,
  pub query_max_rows:    usize,
  pub query_timeout_ms:  u64,
  pub oracle_base_url:   String,
  pub oracle_api_key:    String,
  pub oracle_model:      String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let limits = QueryLimits::default();
    Self {
      host:              "127.0.0.1".into(),
      port:              8080,
      metadata_path:     PathBuf::from("~/.local/share/tabula/metadata.db"),
      blob_root:         PathBuf::from("~/.local/share/tabula/blobs"),
      blob_secret:       String::new(),
      scratch_dir:       std::env::temp_dir().join("tabula"),
      private_prefix:    DEFAULT_PRIVATE_PREFIX.into(),
      download_ttl_secs: 3600,
      max_upload_bytes:  64 * 1024 * 1024,
      query_max_rows:    limits.max_rows,
      query_timeout_ms:  u64::try_from(limits.timeout.as_millis()).unwrap_or(u64::MAX),
      oracle_base_url:   "https://api.openai.com/v1".into(),
      oracle_api_key:    String::new(),
      oracle_model:      "gpt-4o-mini".into(),
    }
  }
}

impl ServerConfig {
  pub fn download_ttl(&self) -> Duration { Duration::from_secs(self.download_ttl_secs) }

  pub fn materializer(&self) -> MaterializerConfig {
    MaterializerConfig {
      scratch_dir:    self.scratch_dir.clone(),
      private_prefix: self.private_prefix.clone(),
    }
  }

  pub fn sandbox(&self) -> SandboxConfig {
    SandboxConfig {
      scratch_dir:  self.scratch_dir.clone(),
      download_ttl: self.download_ttl(),
      limits:       QueryLimits {
        max_rows: self.query_max_rows,
        timeout:  Duration::from_millis(self.query_timeout_ms),
      },
    }
  }

  pub fn catalog(&self) -> CatalogConfig {
    CatalogConfig { private_prefix: self.private_prefix.clone(), download_ttl: self.download_ttl() }
  }

  pub fn oracle(&self) -> OracleConfig {
    OracleConfig::new(&self.oracle_base_url, &self.oracle_api_key, &self.oracle_model)
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<B, M, O> {
  pub meta:         Arc<M>,
  pub materializer: Materializer<B, M>,
  pub catalog:      Catalog<B, M>,
  pub sandbox:      Sandbox<B>,
  pub conversation: Conversation<B, M, O>,
  pub config:       Arc<ServerConfig>,
}

impl<B, M, O> Clone for AppState<B, M, O> {
  fn clone(&self) -> Self {
    Self {
      meta:         self.meta.clone(),
      materializer: self.materializer.clone(),
      catalog:      self.catalog.clone(),
      sandbox:      self.sandbox.clone(),
      conversation: self.conversation.clone(),
      config:       self.config.clone(),
    }
  }
}

impl<B: BlobStore, M: MetadataStore, O: Oracle> AppState<B, M, O> {
  /// Wire the engine services around the given collaborators.
  pub fn new(blob: Arc<B>, meta: Arc<M>, oracle: Arc<O>, config: ServerConfig) -> Self {
    let sandbox = Sandbox::new(blob.clone(), config.sandbox());
    Self {
      materializer: Materializer::new(blob.clone(), meta.clone(), config.materializer()),
      catalog: Catalog::new(blob, meta.clone(), config.catalog()),
      conversation: Conversation::new(meta.clone(), sandbox.clone(), oracle),
      sandbox,
      meta,
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router.
///
/// | Method | Path | Handler |
/// |--------|------|---------|
/// | `GET` / `POST` | `/datasets` | list / multipart upload |
/// | `GET` / `DELETE` | `/datasets/{id}` | fetch / delete |
/// | `GET` | `/datasets/{id}/schema` | introspected tables |
/// | `GET` | `/datasets/{id}/download` | single-use reference |
/// | `POST` | `/datasets/{id}/rename` | `{"name": ...}` |
/// | `POST` | `/datasets/{id}/query` | `{"sql": ...}` |
/// | `POST` | `/chat` | ask a question |
/// | `GET` | `/chats/{id}/messages` | chat history |
/// | `GET` | `/objects` | raw blob listing |
pub fn router<B, M, O>(state: AppState<B, M, O>) -> Router
where
  B: BlobStore + 'static,
  M: MetadataStore + 'static,
  O: Oracle + 'static,
{
  let body_limit = state.config.max_upload_bytes;
  Router::new()
    .route("/datasets", get(datasets::list::<B, M, O>).post(datasets::upload::<B, M, O>))
    .route(
      "/datasets/{id}",
      get(datasets::get_one::<B, M, O>).delete(datasets::delete_one::<B, M, O>),
    )
    .route("/datasets/{id}/schema", get(datasets::schema::<B, M, O>))
    .route("/datasets/{id}/download", get(datasets::download::<B, M, O>))
    .route("/datasets/{id}/rename", post(datasets::rename::<B, M, O>))
    .route("/datasets/{id}/query", post(datasets::query::<B, M, O>))
    .route("/chat", post(chat::ask::<B, M, O>))
    .route("/chats/{id}/messages", get(chat::messages::<B, M, O>))
    .route("/objects", get(datasets::objects::<B, M, O>))
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
