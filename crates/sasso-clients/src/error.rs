use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0} is not configured")]
  Unconfigured(&'static str),

  #[error("failed to build HTTP client: {0}")]
  Build(#[source] reqwest::Error),

  /// Every attempt hit a retryable status, a timeout or a refused connection.
  #[error("{operation} unavailable after {attempts} attempts: {message}")]
  Exhausted { operation: &'static str, attempts: u32, message: String },

  #[error("{operation} failed: {source}")]
  Request {
    operation: &'static str,
    #[source]
    source:    reqwest::Error,
  },

  #[error("{operation} returned {status}: {body}")]
  Status { operation: &'static str, status: u16, body: String },

  #[error("unexpected {operation} response: {message}")]
  Protocol { operation: &'static str, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
