//! Upload intake: scratch file → parse → pipeline → blob store → metadata row.
//!
//! The blob store is only called once the local database file is complete, so
//! a parse or pipeline failure leaves nothing durable behind. Both scratch
//! files (uploaded source and generated database) are removed on every path.

use std::{path::PathBuf, sync::Arc};

use bytes::Bytes;
use serde::Serialize;
use tabula_core::{
  Error as CoreError,
  blob::BlobStore,
  dataset::{DatasetRecord, NewDataset, SQLITE_CONTENT_TYPE, SourceFormat, has_sqlite_signature},
  keys::{self, DEFAULT_PRIVATE_PREFIX},
  store::MetadataStore,
  table::ColumnDef,
};

use crate::{
  Error, Result,
  pipeline::{self, IngestPlan, IngestSummary},
  scratch::{self, ScratchFile},
  source::{self, CsvOptions, JsonOptions},
};

#[derive(Debug, Clone)]
pub struct MaterializerConfig {
  pub scratch_dir:    PathBuf,
  pub private_prefix: String,
}

impl MaterializerConfig {
  pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
    Self { scratch_dir: scratch_dir.into(), private_prefix: DEFAULT_PRIVATE_PREFIX.into() }
  }
}

/// One named file as received at the upload boundary.
#[derive(Debug, Clone)]
pub struct Upload {
  pub file_name:    String,
  pub content_type: String,
  pub bytes:        Bytes,
}

/// Every option the upload boundary understands; [`Materializer::intake`]
/// hands each format the subset it uses.
#[derive(Debug, Clone, Default)]
pub struct IntakeOptions {
  pub table:       Option<String>,
  pub columns:     Option<Vec<ColumnDef>>,
  pub infer_types: bool,
  pub multi_table: bool,
}

/// Outcome of a successful intake. `ingested` is `None` for verbatim uploads.
#[derive(Debug, Clone, Serialize)]
pub struct Materialized {
  pub dataset:  DatasetRecord,
  pub ingested: Option<IngestSummary>,
}

pub struct Materializer<B, M> {
  blob:   Arc<B>,
  meta:   Arc<M>,
  config: Arc<MaterializerConfig>,
}

impl<B, M> Clone for Materializer<B, M> {
  fn clone(&self) -> Self {
    Self { blob: self.blob.clone(), meta: self.meta.clone(), config: self.config.clone() }
  }
}

impl<B: BlobStore, M: MetadataStore> Materializer<B, M> {
  pub fn new(blob: Arc<B>, meta: Arc<M>, config: MaterializerConfig) -> Self {
    Self { blob, meta, config: Arc::new(config) }
  }

  /// Route an upload by its declared MIME type.
  pub async fn intake(&self, owner_id: &str, upload: Upload, options: IntakeOptions) -> Result<Materialized> {
    match SourceFormat::from_content_type(&upload.content_type) {
      SourceFormat::Csv => {
        let opts = CsvOptions { table: options.table, columns: options.columns };
        self.ingest_csv(owner_id, upload, opts).await
      }
      SourceFormat::Json => {
        let opts = JsonOptions {
          table:       options.table,
          infer_types: options.infer_types,
          multi_table: options.multi_table,
        };
        self.ingest_json(owner_id, upload, opts).await
      }
      SourceFormat::Sqlite => self.upload_sqlite(owner_id, upload).await,
      SourceFormat::Raw => self.upload_raw(owner_id, upload).await,
    }
  }

  /// Store the bytes verbatim under the upload's own content type.
  pub async fn upload_raw(&self, owner_id: &str, upload: Upload) -> Result<Materialized> {
    validate(owner_id, &upload)?;
    let file_name = keys::sanitize_file_name(&upload.file_name);
    let key = keys::new_dataset_key(&self.config.private_prefix, owner_id, &file_name);

    let dataset = self
      .persist(owner_id, file_name, key, upload.bytes.to_vec(), upload.content_type)
      .await?;
    tracing::info!(dataset_id = %dataset.dataset_id, bytes = dataset.byte_size, "stored raw upload");
    Ok(Materialized { dataset, ingested: None })
  }

  /// Store a pre-built SQLite file after checking its header signature.
  pub async fn upload_sqlite(&self, owner_id: &str, upload: Upload) -> Result<Materialized> {
    validate(owner_id, &upload)?;
    if !has_sqlite_signature(&upload.bytes) {
      return Err(
        CoreError::Validation(format!("{:?} is not a SQLite database file", upload.file_name)).into(),
      );
    }
    let file_name = keys::sanitize_file_name(&upload.file_name);
    let key = keys::new_dataset_key(&self.config.private_prefix, owner_id, &file_name);

    let dataset = self
      .persist(owner_id, file_name, key, upload.bytes.to_vec(), SQLITE_CONTENT_TYPE.into())
      .await?;
    tracing::info!(dataset_id = %dataset.dataset_id, "stored sqlite upload");
    Ok(Materialized { dataset, ingested: None })
  }

  pub async fn ingest_csv(&self, owner_id: &str, upload: Upload, options: CsvOptions) -> Result<Materialized> {
    self
      .ingest_with(owner_id, upload, options.table.clone(), move |bytes, table| {
        source::plan_csv(bytes, table, options.columns)
      })
      .await
  }

  pub async fn ingest_json(&self, owner_id: &str, upload: Upload, options: JsonOptions) -> Result<Materialized> {
    let table = options.table.clone();
    self
      .ingest_with(owner_id, upload, table, move |bytes, table| source::plan_json(bytes, table, &options))
      .await
  }

  async fn ingest_with<F>(
    &self,
    owner_id: &str,
    upload: Upload,
    table: Option<String>,
    plan: F,
  ) -> Result<Materialized>
  where
    F: FnOnce(&[u8], String) -> Result<IngestPlan>,
  {
    validate(owner_id, &upload)?;
    let unique = keys::unique_id();
    let file_name = keys::sanitize_file_name(&upload.file_name);
    let table = table
      .filter(|t| !t.trim().is_empty())
      .unwrap_or_else(|| keys::table_name_for(&file_name));

    scratch::ensure_dir(&self.config.scratch_dir).await?;
    let source_file =
      ScratchFile::new(&self.config.scratch_dir, &format!("{unique}_src_{file_name}"));
    let db_file =
      ScratchFile::new(&self.config.scratch_dir, &keys::database_file_name(&unique, &file_name));

    tokio::fs::write(source_file.path(), &upload.bytes).await?;
    let raw = tokio::fs::read(source_file.path()).await?;
    let plan = plan(&raw, table)?;
    let summary = pipeline::ingest(db_file.path(), plan).await?;
    let bytes = tokio::fs::read(db_file.path()).await?;

    let key = format!(
      "{}{}",
      keys::owner_prefix(&self.config.private_prefix, owner_id),
      keys::database_file_name(&unique, &file_name)
    );
    let dataset = self
      .persist(owner_id, file_name, key, bytes, SQLITE_CONTENT_TYPE.into())
      .await?;

    tracing::info!(
      dataset_id = %dataset.dataset_id,
      tables = summary.tables.len(),
      bytes = dataset.byte_size,
      "ingested upload"
    );
    Ok(Materialized { dataset, ingested: Some(summary) })
  }

  /// Blob first, then the metadata row. If the row cannot be written the
  /// object is deleted again; when that also fails the caller gets a
  /// `PartialFailure` naming the orphaned key.
  async fn persist(
    &self,
    owner_id: &str,
    name: String,
    key: String,
    bytes: Vec<u8>,
    content_type: String,
  ) -> Result<DatasetRecord> {
    let byte_size = bytes.len() as u64;
    let key = self
      .blob
      .put(key, bytes, content_type.clone())
      .await
      .map_err(Error::blob)?;

    let input = NewDataset {
      name,
      storage_key: key.clone(),
      owner_id: owner_id.to_string(),
      content_type,
      byte_size,
    };
    match self.meta.create_dataset(input).await {
      Ok(record) => Ok(record),
      Err(e) => {
        tracing::error!(key = %key, error = %e, "metadata write failed after upload");
        match self.blob.delete(key.clone()).await {
          Ok(_) => Err(Error::metadata(e)),
          Err(cleanup) => {
            tracing::warn!(key = %key, error = %cleanup, "could not remove orphaned object");
            Err(
              CoreError::PartialFailure(format!(
                "object {key} was stored but its dataset record was not: {e}"
              ))
              .into(),
            )
          }
        }
      }
    }
  }
}

fn validate(owner_id: &str, upload: &Upload) -> Result<()> {
  if owner_id.trim().is_empty() || owner_id.contains('/') {
    return Err(CoreError::Validation("invalid owner id".into()).into());
  }
  if upload.bytes.is_empty() {
    return Err(CoreError::Validation("upload is empty".into()).into());
  }
  Ok(())
}
