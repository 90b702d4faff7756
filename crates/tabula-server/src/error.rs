//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tabula_core::ErrorKind;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing or empty x-owner-id header")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] tabula_core::Error),

  #[error(transparent)]
  Engine(#[from] tabula_engine::Error),

  #[error("metadata store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    ApiError::Store(Box::new(e))
  }

  fn kind(&self) -> Option<ErrorKind> {
    match self {
      ApiError::Unauthorized => None,
      ApiError::BadRequest(_) => Some(ErrorKind::Validation),
      ApiError::Core(e) => Some(e.kind()),
      ApiError::Engine(e) => Some(e.kind()),
      ApiError::Store(_) => Some(ErrorKind::Upstream),
    }
  }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
    ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
    ErrorKind::PartialFailure => StatusCode::INTERNAL_SERVER_ERROR,
    ErrorKind::Integrity => StatusCode::UNPROCESSABLE_ENTITY,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let status = kind.map_or(StatusCode::UNAUTHORIZED, status_for);
    let message = self.to_string();

    if status.is_server_error() {
      tracing::warn!(%status, error = %message, "request failed");
    }

    let body = match kind {
      Some(ErrorKind::PartialFailure) => json!({ "error": message, "partial": true }),
      _ => json!({ "error": message }),
    };
    (status, Json(body)).into_response()
  }
}
