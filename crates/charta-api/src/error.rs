//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use charta_core::{Error as CoreError, dosage::DosageError};
use charta_engine::Error as EngineError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// `If-Match` named a version of the visit that is no longer current.
  #[error("visit has changed since it was read")]
  PreconditionFailed,

  #[error(transparent)]
  Engine(#[from] EngineError),
}

impl From<CoreError> for ApiError {
  fn from(err: CoreError) -> Self { Self::Engine(err.into()) }
}

impl From<DosageError> for ApiError {
  fn from(err: DosageError) -> Self { CoreError::from(err).into() }
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
      Self::Engine(EngineError::Core(err)) => core_status(err),
      Self::Engine(EngineError::PipelineClosed(_)) => {
        StatusCode::SERVICE_UNAVAILABLE
      }
      Self::Engine(EngineError::Detection(_)) => StatusCode::BAD_GATEWAY,
    }
  }
}

fn core_status(err: &CoreError) -> StatusCode {
  match err {
    CoreError::Locked { .. } => StatusCode::LOCKED,
    CoreError::Dosage(_) | CoreError::NoSuchEntry { .. } => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    CoreError::SaveFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
    CoreError::ConcurrentCommitConflict { .. }
    | CoreError::InvalidTransition { .. }
    | CoreError::RestoreNotPermitted { .. }
    | CoreError::SubmissionPending => StatusCode::CONFLICT,
    CoreError::VisitNotFound(_)
    | CoreError::VersionNotFound { .. }
    | CoreError::NoPendingSubmission => StatusCode::NOT_FOUND,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
