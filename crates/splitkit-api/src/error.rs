//! API error type and [`axum::response::IntoResponse`] implementation.

use std::fmt::Display;

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use splitkit_core::{ClassifyError, ErrorKind};
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// The store could not be reached; the detail is logged, not returned.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  /// Anything the client cannot fix; the detail is logged, not returned.
  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Translate any classified store or core error into an HTTP error.
  pub fn from_store<E: ClassifyError + Display>(err: E) -> Self {
    let message = err.to_string();
    match err.kind() {
      ErrorKind::InvalidInput => {
        tracing::warn!(error = %message, "validation failed");
        Self::BadRequest(message)
      }
      ErrorKind::NotFound => Self::NotFound(message),
      ErrorKind::Conflict => Self::Conflict(message),
      ErrorKind::Unavailable => Self::Unavailable(message),
      ErrorKind::Misconfigured | ErrorKind::Internal => Self::Internal(message),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
      ApiError::Unavailable(m) => {
        tracing::error!(error = %m, "store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, "store unavailable".to_owned())
      }
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
