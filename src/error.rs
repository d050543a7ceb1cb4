//! Error taxonomy shared by the core and the HTTP layer.
//!
//! `TutorError` is fatal to the current request. `ProviderError` never is:
//! every call site that talks to the content provider matches on it and
//! substitutes fallback content.

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TutorError {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("invalid submission: {0}")]
  InvalidSubmission(String),

  #[error("store failure: {0}")]
  Store(String),
}

impl TutorError {
  pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
    Self::NotFound { entity, id: id.into() }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::NotFound { .. } => StatusCode::NOT_FOUND,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::InvalidSubmission(_) => StatusCode::BAD_REQUEST,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for TutorError {
  fn into_response(self) -> axum::response::Response {
    let status = self.status();
    (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
  }
}

/// Failure of the external content provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
  #[error("content provider disabled (no API key configured)")]
  Disabled,

  #[error("transport error: {0}")]
  Transport(String),

  #[error("provider call timed out")]
  Timeout,

  #[error("provider HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("malformed provider response: {0}")]
  Malformed(String),
}

impl ProviderError {
  /// Transient failures are worth another attempt; the rest are not.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport(_) | Self::Timeout => true,
      Self::Status { status, .. } => *status == 429 || *status >= 500,
      Self::Disabled | Self::Malformed(_) => false,
    }
  }
}

impl From<reqwest::Error> for ProviderError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      Self::Timeout
    } else if e.is_decode() {
      Self::Malformed(e.to_string())
    } else {
      Self::Transport(e.to_string())
    }
  }
}
