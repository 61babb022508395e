//! Error types and axum `IntoResponse` implementation.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
  /// `technician_numbers` is empty or holds something other than E.164.
  #[error("invalid technician numbers")]
  InvalidTechnicians,

  /// The spawned reconciliation task panicked or was cancelled.
  #[error("reconciliation task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::InvalidTechnicians => {
        error!("invalid or empty technician numbers");
        (StatusCode::INTERNAL_SERVER_ERROR, "Invalid technician numbers").into_response()
      }
      Error::Task(e) => {
        error!(error = %e, "unhandled error while serving webhook");
        (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred.").into_response()
      }
    }
  }
}
