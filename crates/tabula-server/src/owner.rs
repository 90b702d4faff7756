//! Caller identity, as asserted by the gateway in front of the server.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const OWNER_HEADER: &str = "x-owner-id";

/// The requesting user's id. Rejects with 401 when the header is absent,
/// empty, or not usable as a key segment.
#[derive(Debug, Clone)]
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let id = parts
      .headers
      .get(OWNER_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty() && !v.contains('/'))
      .ok_or(ApiError::Unauthorized)?;
    Ok(Owner(id.to_string()))
  }
}
