//! Call lifecycle events, one per webhook delivery.
//!
//! A [`CallEvent`] is built from the flat form fields Twilio posts
//! ([`WebhookFields`]) and discarded once reconciled.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Which point in the call lifecycle a webhook reports.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
  /// The inbound call reached `/voice` and is ringing.
  Initiated,
  /// The `<Dial>` verb finished; carries `DialCallStatus`.
  DialOutcome,
  /// A dialed leg's status callback; carries `CallStatus` and `CallDuration`.
  Completed,
}

impl EventKind {
  /// Terminal events produce the final disposition and are deduplicated.
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Initiated) }
}

// ─── Raw webhook fields ──────────────────────────────────────────────────────

/// The subset of Twilio's form-encoded webhook parameters the connector
/// reads. Unknown parameters are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookFields {
  #[serde(rename = "From")]
  pub from:             Option<String>,
  #[serde(rename = "CallSid")]
  pub call_sid:         Option<String>,
  #[serde(rename = "ParentCallSid")]
  pub parent_call_sid:  Option<String>,
  #[serde(rename = "DialCallSid")]
  pub dial_call_sid:    Option<String>,
  #[serde(rename = "DialCallStatus")]
  pub dial_call_status: Option<String>,
  #[serde(rename = "CallStatus")]
  pub call_status:      Option<String>,
  #[serde(rename = "CallDuration")]
  pub call_duration:    Option<String>,
  #[serde(rename = "Digits")]
  pub digits:           Option<String>,
}

impl WebhookFields {
  /// The caller's number, if present and non-blank.
  pub fn subject(&self) -> Option<&str> { non_blank(self.from.as_deref()) }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// The identifiers that key a call in the idempotency store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
  pub subject:   String,
  pub call_id:   String,
  /// The linked leg: the inbound leg for a dialed leg's callback, or the
  /// dialed leg for the inbound leg's dial action.
  pub parent_id: Option<String>,
}

impl CallKey {
  pub fn new(subject: impl Into<String>, call_id: impl Into<String>) -> Self {
    Self { subject: subject.into(), call_id: call_id.into(), parent_id: None }
  }

  pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
    self.parent_id = Some(parent_id.into());
    self
  }

  /// `call_id` followed by `parent_id`, skipping a parent equal to the call.
  pub fn ids(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.call_id.as_str()).chain(
      self
        .parent_id
        .as_deref()
        .filter(|p| *p != self.call_id),
    )
  }
}

/// A single webhook delivery describing one call leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
  /// Provider-assigned identifier for this leg. Empty for an `Initiated`
  /// event delivered without a `CallSid`.
  pub call_id:          String,
  pub parent_id:        Option<String>,
  /// The external phone number the record is keyed by.
  pub subject:          String,
  pub kind:             EventKind,
  pub provider_status:  Option<String>,
  pub duration_seconds: u64,
  pub observed_at_ms:   i64,
}

impl CallEvent {
  /// Build an event from raw webhook fields.
  ///
  /// Fails when the event cannot be keyed: no caller number, or a terminal
  /// event without a `CallSid`.
  pub fn from_webhook(
    kind: EventKind,
    fields: &WebhookFields,
    observed_at_ms: i64,
  ) -> Result<Self> {
    let subject = fields.subject().ok_or(Error::MissingSubject)?.to_owned();

    let call_id = match non_blank(fields.call_sid.as_deref()) {
      Some(sid) => sid.to_owned(),
      None if kind.is_terminal() => return Err(Error::MissingCallId { kind }),
      None => String::new(),
    };

    let parent_id = non_blank(fields.parent_call_sid.as_deref())
      .or_else(|| non_blank(fields.dial_call_sid.as_deref()))
      .map(str::to_owned);

    let (primary, fallback) = match kind {
      EventKind::Completed => (&fields.call_status, &fields.dial_call_status),
      _ => (&fields.dial_call_status, &fields.call_status),
    };
    let provider_status = non_blank(primary.as_deref())
      .or_else(|| non_blank(fallback.as_deref()))
      .map(str::to_owned);

    Ok(Self {
      call_id,
      parent_id,
      subject,
      kind,
      provider_status,
      duration_seconds: parse_duration(fields.call_duration.as_deref()),
      observed_at_ms,
    })
  }

  pub fn key(&self) -> CallKey {
    CallKey {
      subject:   self.subject.clone(),
      call_id:   self.call_id.clone(),
      parent_id: self.parent_id.clone(),
    }
  }
}

/// Parse `CallDuration`. Anything other than plain ASCII digits counts as
/// zero, including a value too large for `u64`.
pub fn parse_duration(raw: Option<&str>) -> u64 {
  match raw.map(str::trim) {
    Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
      s.parse().unwrap_or(0)
    }
    _ => 0,
  }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}
