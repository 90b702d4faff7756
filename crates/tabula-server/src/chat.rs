//! Handlers for `/chat` and `/chats/{id}/messages`.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::Deserialize;
use tabula_core::{
  Error as CoreError,
  blob::BlobStore,
  chat::{ChatMessage, VisualizationHint},
  oracle::Oracle,
  store::MetadataStore,
};
use tabula_engine::conversation::{Answer, AnswerStatus, AskRequest};
use uuid::Uuid;

use crate::{AppState, error::ApiError, owner::Owner};

#[derive(Debug, Deserialize)]
pub struct AskBody {
  pub dataset_id:    Uuid,
  pub chat_id:       Option<Uuid>,
  pub question:      String,
  pub visualization: Option<VisualizationHint>,
}

/// `POST /chat`
///
/// Always answers with the [`Answer`] body; the status code reflects how the
/// run ended.
pub async fn ask<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Json(body): Json<AskBody>,
) -> (StatusCode, Json<Answer>)
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  let answer = state
    .conversation
    .ask(AskRequest {
      owner_id:      owner,
      dataset_id:    body.dataset_id,
      chat_id:       body.chat_id,
      question:      body.question,
      visualization: body.visualization,
    })
    .await;

  let status = match answer.status {
    AnswerStatus::Answered => StatusCode::OK,
    AnswerStatus::Invalid => StatusCode::BAD_REQUEST,
    AnswerStatus::NotFound => StatusCode::NOT_FOUND,
    AnswerStatus::PermissionDenied => StatusCode::FORBIDDEN,
    AnswerStatus::Failed => StatusCode::BAD_GATEWAY,
  };
  (status, Json(answer))
}

/// `GET /chats/{id}/messages`
pub async fn messages<B, M, O>(
  State(state): State<AppState<B, M, O>>,
  Owner(owner): Owner,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError>
where
  B: BlobStore,
  M: MetadataStore,
  O: Oracle,
{
  let chat = state
    .meta
    .get_chat(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| CoreError::NotFound(format!("chat {id}")))?;
  if chat.owner_id != owner {
    return Err(CoreError::PermissionDenied(format!("chat {id} belongs to another user")).into());
  }
  let messages = state.meta.list_messages(id).await.map_err(ApiError::store)?;
  Ok(Json(messages))
}
