//! The `CrmClient` trait: the reconciler's only view of the CRM.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::disposition::{Disposition, Outcome, Resolution};

/// One call-log submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLog {
  /// The caller's number; contacts are resolved by it.
  pub subject:          String,
  pub duration_seconds: u64,
  pub timestamp_ms:     i64,
  pub disposition:      Disposition,
  pub outcome:          Outcome,
}

impl CallLog {
  pub fn new(
    subject: impl Into<String>,
    duration_seconds: u64,
    timestamp_ms: i64,
    resolution: Resolution,
  ) -> Self {
    Self {
      subject: subject.into(),
      duration_seconds,
      timestamp_ms,
      disposition: resolution.disposition,
      outcome: resolution.outcome,
    }
  }

  pub fn duration_ms(&self) -> u64 { self.duration_seconds.saturating_mul(1000) }
}

/// Identifiers the CRM assigned to a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedCall {
  pub contact_id: String,
  pub call_id:    Option<String>,
}

/// Why a submission did not land.
#[derive(Debug, Error)]
pub enum CrmError {
  #[error("crm client is not configured")]
  Unconfigured,

  /// Retries were exhausted on throttling, server errors or timeouts.
  #[error("crm unavailable after {attempts} attempts: {message}")]
  Transient { attempts: u32, message: String },

  /// The CRM answered with a non-retryable status.
  #[error("crm rejected {operation} with status {status}: {body}")]
  Rejected { operation: &'static str, status: u16, body: String },

  #[error("no contact could be resolved for {0}")]
  NoContact(String),

  #[error("unexpected crm response: {0}")]
  Protocol(String),
}

impl CrmError {
  pub fn is_transient(&self) -> bool { matches!(self, Self::Transient { .. }) }
}

/// Contact resolution plus call-log submission against an external CRM.
///
/// Stateless per call: contacts are re-queried on every submission.
pub trait CrmClient: Send + Sync {
  fn log_call<'a>(
    &'a self,
    log: &'a CallLog,
  ) -> impl Future<Output = Result<LoggedCall, CrmError>> + Send + 'a;
}
