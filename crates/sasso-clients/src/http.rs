//! Shared request plumbing: client construction, bounded retries and status
//! checks.

use std::time::Duration;

use reqwest::{Client, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{Error, Result};

/// Statuses worth another attempt.
const RETRYABLE: [StatusCode; 5] = [
  StatusCode::TOO_MANY_REQUESTS,
  StatusCode::INTERNAL_SERVER_ERROR,
  StatusCode::BAD_GATEWAY,
  StatusCode::SERVICE_UNAVAILABLE,
  StatusCode::GATEWAY_TIMEOUT,
];

pub fn is_retryable(status: StatusCode) -> bool { RETRYABLE.contains(&status) }

/// Build a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client> {
  Client::builder().timeout(timeout).build().map_err(Error::Build)
}

// ─── Retry ───────────────────────────────────────────────────────────────────

/// Attempt budget and exponential backoff for outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero is treated as one.
  pub max_attempts: u32,
  /// Delay before the second attempt; doubled for each one after.
  pub backoff:      Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, backoff: Duration::from_millis(500) } }
}

impl RetryPolicy {
  /// No retries and no delay.
  pub const fn once() -> Self { Self { max_attempts: 1, backoff: Duration::ZERO } }

  /// The pause after failed attempt number `attempt` (1-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    self.backoff.saturating_mul(factor)
  }

  /// Send `request`, retrying on throttling, gateway errors and refused
  /// connections. Timeouts are retried only for idempotent methods: a
  /// timed-out write may already have been applied.
  ///
  /// Any other response, successful or not, is returned as-is for the caller
  /// to judge.
  pub async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
    let (client, request) = request.build_split();
    let request    = request.map_err(|source| Error::Request { operation, source })?;
    let replayable = request.method().is_idempotent();
    self.execute(operation, &client, request, replayable).await
  }

  /// [`send`](Self::send) for a `POST` that only reads, such as a search,
  /// and so may be retried after a timeout.
  pub async fn send_read(
    &self,
    operation: &'static str,
    request: RequestBuilder,
  ) -> Result<Response> {
    let (client, request) = request.build_split();
    let request = request.map_err(|source| Error::Request { operation, source })?;
    self.execute(operation, &client, request, true).await
  }

  async fn execute(
    &self,
    operation: &'static str,
    client: &Client,
    request: Request,
    replayable: bool,
  ) -> Result<Response> {
    let attempts   = self.max_attempts.max(1);
    let mut reason = String::from("no attempt made");

    for attempt in 1..=attempts {
      let Some(req) = request.try_clone() else {
        // Streaming bodies cannot be replayed; send once.
        return client
          .execute(request)
          .await
          .map_err(|source| Error::Request { operation, source });
      };

      match client.execute(req).await {
        Ok(resp) if is_retryable(resp.status()) => reason = format!("status {}", resp.status()),
        Ok(resp) => return Ok(resp),
        Err(e) if e.is_connect() => reason = e.to_string(),
        Err(e) if e.is_timeout() && replayable => reason = e.to_string(),
        Err(e) if e.is_timeout() => {
          warn!(operation, attempt, error = %e, "write timed out; not retrying");
          return Err(Error::Exhausted { operation, attempts: attempt, message: e.to_string() });
        }
        Err(source) => return Err(Error::Request { operation, source }),
      }

      if attempt < attempts {
        let delay = self.delay(attempt);
        warn!(operation, attempt, ?delay, %reason, "retrying request");
        tokio::time::sleep(delay).await;
      }
    }

    Err(Error::Exhausted { operation, attempts, message: reason })
  }
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// Fail with [`Error::Status`] unless `resp` carries `expected`.
pub async fn expect_status(
  operation: &'static str,
  resp: Response,
  expected: StatusCode,
) -> Result<Response> {
  let status = resp.status();
  if status == expected {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  Err(Error::Status { operation, status: status.as_u16(), body })
}

/// Decode a JSON body, reporting shape mismatches as [`Error::Protocol`].
pub async fn json<T: DeserializeOwned>(operation: &'static str, resp: Response) -> Result<T> {
  resp
    .json()
    .await
    .map_err(|e| Error::Protocol { operation, message: e.to_string() })
}
