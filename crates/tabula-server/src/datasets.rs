//! Handlers for `/datasets` and `/objects`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/datasets` | Caller's datasets, newest first |
//! | `POST`   | `/datasets` | Multipart: `file`, optional `table`, `columns`, `infer_types`, `multi_table` |
//! | `GET`    | `/datasets/{id}` | 404 if absent, 403 if someone else's |
//! | `DELETE` | `/datasets/{id}` | 204; 500 with `"partial": true` if only the object went |
//! | `GET`    | `/datasets/{id}/schema` | |
//! | `GET`    | `/datasets/{id}/download` | |
//! | `POST`   | `/datasets/{id}/rename` | Body: `{"name":"new.csv"}` |
//! | `POST`   | `/datasets/{id}/query` | Body: `{"sql":"SELECT ..."}` |
//! | `GET`    | `/objects` | |

use axum::{
  Json,
  extract::{Multipart, Path, State, multipart::Field},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tabula_core::{
  blob::{BlobEntry, BlobStore, DownloadRef},
  dataset::DatasetRecord,
  oracle::Oracle,
  store::MetadataStore,
  table::{ColumnDef, DatabaseSchema},
};
use tabula_engine::{
  materialize::{IntakeOptions, Upload},
  sandbox::QueryResult,
};
use uuid::Uuid;

use crate::{AppState, error::ApiError, owner::Owner};

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /datasets`
pub async fn list<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
) -> Result<Json<Vec<DatasetRecord>>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  Ok(Json(state.catalog.list(&owner).await?))
}

/// `GET /datasets/{id}`
pub async fn get_one<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
) -> Result<Json<DatasetRecord>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  Ok(Json(state.catalog.get(&owner, id).await?))
}

// ─── Upload ───────────────────────────────────────────────────────────────────

/// `POST /datasets` (multipart)
///
/// The `file` part's declared content type picks the intake path; it is
/// never sniffed.
pub async fn upload<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  let mut upload = None;
  let mut options = IntakeOptions::default();

  while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
    let name = field.name().unwrap_or_default().to_string();
    match name.as_str() {
      "file" => {
        if upload.is_some() {
          return Err(ApiError::BadRequest("only one file per upload".into()));
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
          .content_type()
          .unwrap_or("application/octet-stream")
          .to_string();
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        upload = Some(Upload { file_name, content_type, bytes });
      }
      "table" => options.table = Some(text(field).await?),
      "columns" => {
        let raw = text(field).await?;
        let columns: Vec<ColumnDef> = serde_json::from_str(&raw)
          .map_err(|e| ApiError::BadRequest(format!("columns: {e}")))?;
        options.columns = Some(columns);
      }
      "infer_types" => options.infer_types = flag(&name, &text(field).await?)?,
      "multi_table" => options.multi_table = flag(&name, &text(field).await?)?,
      other => tracing::debug!(field = other, "ignoring unknown multipart field"),
    }
  }

  let upload = upload.ok_or_else(|| ApiError::BadRequest("missing `file` part".into()))?;
  let materialized = state.materializer.intake(&owner, upload, options).await?;
  Ok((StatusCode::CREATED, Json(materialized)))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
  ApiError::BadRequest(format!("malformed multipart body: {e}"))
}

async fn text(field: Field<'_>) -> Result<String, ApiError> {
  field.text().await.map_err(bad_multipart)
}

fn flag(name: &str, value: &str) -> Result<bool, ApiError> {
  match value.trim().to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Ok(true),
    "false" | "0" | "no" | "off" | "" => Ok(false),
    other => Err(ApiError::BadRequest(format!("{name}: expected a boolean, got {other:?}"))),
  }
}

// ─── Schema / query ───────────────────────────────────────────────────────────

/// `GET /datasets/{id}/schema`
pub async fn schema<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
) -> Result<Json<DatabaseSchema>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  let dataset = state.catalog.get(&owner, id).await?;
  Ok(Json(state.sandbox.introspect_schema(&dataset.storage_key).await?))
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
  pub sql: String,
}

/// `POST /datasets/{id}/query`
pub async fn query<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
  Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  let dataset = state.catalog.get(&owner, id).await?;
  Ok(Json(state.sandbox.execute(&dataset.storage_key, &body.sql).await?))
}

// ─── Rename / delete / download ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RenameBody {
  pub name: String,
}

/// `POST /datasets/{id}/rename`
pub async fn rename<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
  Json(body): Json<RenameBody>,
) -> Result<Json<DatasetRecord>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  Ok(Json(state.catalog.rename(&owner, id, &body.name).await?))
}

/// `DELETE /datasets/{id}`
pub async fn delete_one<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  state.catalog.delete(&owner, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /datasets/{id}/download`
pub async fn download<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
) -> Result<Json<DownloadRef>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  Ok(Json(state.catalog.download(&owner, id).await?))
}

/// `GET /objects`
pub async fn objects<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
) -> Result<Json<Vec<BlobEntry>>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  Ok(Json(state.catalog.list_objects(&owner).await?))
}
