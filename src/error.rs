//! Error taxonomy of the tutoring core and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TutorError {
  #[error("unknown topic: {0}")]
  UnknownTopic(String),

  #[error("no practice content available for scope '{0}'")]
  NoContentAvailable(String),

  #[error("session {0} is closed")]
  SessionClosed(String),

  #[error("unknown session: {0}")]
  UnknownSession(String),

  #[error("attempt at {attempted} is older than the last recorded attempt at {last} for topic {topic_id}")]
  StaleAttempt { topic_id: String, attempted: String, last: String },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("persistence write failed: {0}")]
  PersistenceWriteFailed(String),

  #[error("persistence read failed: {0}")]
  PersistenceReadFailed(String),

  #[error("assistant unavailable: {0}")]
  AssistantUnavailable(String),
}

impl TutorError {
  pub fn code(&self) -> &'static str {
    match self {
      TutorError::UnknownTopic(_) => "UNKNOWN_TOPIC",
      TutorError::NoContentAvailable(_) => "NO_CONTENT_AVAILABLE",
      TutorError::SessionClosed(_) => "SESSION_CLOSED",
      TutorError::UnknownSession(_) => "UNKNOWN_SESSION",
      TutorError::StaleAttempt { .. } => "STALE_ATTEMPT",
      TutorError::InvalidInput(_) => "INVALID_INPUT",
      TutorError::PersistenceWriteFailed(_) => "PERSISTENCE_WRITE_FAILED",
      TutorError::PersistenceReadFailed(_) => "PERSISTENCE_READ_FAILED",
      TutorError::AssistantUnavailable(_) => "ASSISTANT_UNAVAILABLE",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      TutorError::UnknownTopic(_) | TutorError::UnknownSession(_) => StatusCode::NOT_FOUND,
      TutorError::SessionClosed(_) | TutorError::StaleAttempt { .. } => StatusCode::CONFLICT,
      TutorError::NoContentAvailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
      TutorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
      TutorError::PersistenceWriteFailed(_)
      | TutorError::PersistenceReadFailed(_)
      | TutorError::AssistantUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
  }
}

impl From<StoreError> for TutorError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::Write(msg) => TutorError::PersistenceWriteFailed(msg),
      StoreError::Read(msg) => TutorError::PersistenceReadFailed(msg),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub success: bool,
  pub error: String,
  pub code: String,
}

impl IntoResponse for TutorError {
  fn into_response(self) -> Response {
    let body = ErrorResponse { success: false, error: self.to_string(), code: self.code().to_string() };
    (self.status(), Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_errors_map_to_persistence_variants() {
    let e: TutorError = StoreError::Write("disk full".into()).into();
    assert_eq!(e.code(), "PERSISTENCE_WRITE_FAILED");
    assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

    let e: TutorError = StoreError::Read("timeout".into()).into();
    assert_eq!(e.code(), "PERSISTENCE_READ_FAILED");
  }

  #[test]
  fn logic_errors_are_client_errors() {
    assert_eq!(TutorError::UnknownTopic("x".into()).status(), StatusCode::NOT_FOUND);
    assert_eq!(TutorError::SessionClosed("s".into()).status(), StatusCode::CONFLICT);
    assert_eq!(TutorError::NoContentAvailable("core".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
  }
}
