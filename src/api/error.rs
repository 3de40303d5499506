//! Failure values produced by the fetch capability and carried by the cache.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed upstream fetch.
///
/// Cloneable because one failure is fanned out to every caller sharing the
/// same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
  /// Transport-level failure or a non-404 error status. Retryable.
  #[error("network failure: {message}")]
  Network { message: String, status: Option<u16> },

  /// The requested entity does not exist. Retrying the same lookup won't help.
  #[error("not found: {resource}")]
  NotFound { resource: String },

  /// The response body did not have the expected shape.
  #[error("unexpected response: {message}")]
  Decode { message: String },
}

impl FetchError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::Network {
      message: message.into(),
      status: None,
    }
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network { .. })
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Network { status, .. } => *status,
      Self::NotFound { .. } => Some(404),
      Self::Decode { .. } => None,
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode {
      message: e.to_string(),
    }
  }
}
