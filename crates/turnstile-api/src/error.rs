//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Handlers surface [`turnstile_core::Error`] values; the HTTP status is
//! derived from the error's [`ErrorKind`] so the taxonomy maps onto the
//! wire uniformly: NotFound → 404, Conflict → 409, PolicyViolation → 403,
//! InvalidInput → 400, Storage → 500.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use turnstile_core::ErrorKind;

/// An error returned by an API handler.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub turnstile_core::Error);

impl ApiError {
  /// Lift a store-level error into the API error.
  pub fn store<E: Into<turnstile_core::Error>>(e: E) -> Self { Self(e.into()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match self.0.kind() {
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Conflict => StatusCode::CONFLICT,
      ErrorKind::PolicyViolation => StatusCode::FORBIDDEN,
      ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
      ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": self.0.to_string() }))).into_response()
  }
}
