//! Error types for `sasso-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("webhook event has no caller number")]
  MissingSubject,

  #[error("{kind} event has no CallSid")]
  MissingCallId { kind: crate::event::EventKind },

  #[error("unknown time zone: {0:?}")]
  UnknownTimeZone(String),

  #[error("invalid business hours: open {open}, close {close}")]
  InvalidHours { open: u32, close: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
