//! Disposition Resolver. Maps raw event fields to the CRM classification.
//!
//! Never stored; always recomputed from a [`CallEvent`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::event::{CallEvent, EventKind};

/// Provider statuses that mean the dialed party never picked up.
pub const FAILURE_STATUSES: [&str; 4] = ["no-answer", "busy", "failed", "canceled"];

/// Whether the call leg connected. Rendered in HubSpot's
/// `hs_call_disposition` vocabulary.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
  Connected,
  NoAnswer,
}

/// Lifecycle status reported downstream (`hs_call_status`).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
  InProgress,
  Completed,
  Missed,
}

/// A resolved `(Disposition, Outcome)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
  pub disposition: Disposition,
  pub outcome:     Outcome,
}

impl Resolution {
  pub const CONNECTED: Self =
    Self { disposition: Disposition::Connected, outcome: Outcome::Completed };
  pub const IN_PROGRESS: Self =
    Self { disposition: Disposition::Connected, outcome: Outcome::InProgress };
  pub const MISSED: Self =
    Self { disposition: Disposition::NoAnswer, outcome: Outcome::Missed };

  pub fn is_connected(&self) -> bool { self.disposition == Disposition::Connected }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// How a `Completed` event's status is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRule {
  /// The status must be exactly `completed`.
  #[default]
  RequireCompleted,
  /// Any status outside [`FAILURE_STATUSES`] is accepted.
  ExcludeFailures,
}

/// Thresholds for classifying a `Completed` event as a real conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionPolicy {
  /// A completed leg connects only when its duration is strictly greater.
  pub connected_threshold_seconds: u64,
  pub completion_rule:             CompletionRule,
}

impl Default for DispositionPolicy {
  /// Longer than 15 seconds with status `completed`: screens out voicemail
  /// beeps and immediate hang-ups.
  fn default() -> Self {
    Self {
      connected_threshold_seconds: 15,
      completion_rule:             CompletionRule::RequireCompleted,
    }
  }
}

impl DispositionPolicy {
  /// Any non-zero duration without a failure status.
  pub fn lenient() -> Self {
    Self {
      connected_threshold_seconds: 0,
      completion_rule:             CompletionRule::ExcludeFailures,
    }
  }

  pub fn resolve_event(&self, event: &CallEvent) -> Resolution {
    self.resolve(event.kind, event.provider_status.as_deref(), event.duration_seconds)
  }

  /// Classify one event. A missing status never counts as connected.
  pub fn resolve(
    &self,
    kind: EventKind,
    provider_status: Option<&str>,
    duration_seconds: u64,
  ) -> Resolution {
    match kind {
      EventKind::Initiated => Resolution::IN_PROGRESS,
      EventKind::DialOutcome => match provider_status {
        Some(status) if !is_failure(status) => Resolution::CONNECTED,
        _ => Resolution::MISSED,
      },
      EventKind::Completed => {
        let status_ok = match (self.completion_rule, provider_status) {
          (_, None) => false,
          (CompletionRule::RequireCompleted, Some(s)) => {
            s.trim().eq_ignore_ascii_case("completed")
          }
          (CompletionRule::ExcludeFailures, Some(s)) => !is_failure(s),
        };
        if status_ok && duration_seconds > self.connected_threshold_seconds {
          Resolution::CONNECTED
        } else {
          Resolution::MISSED
        }
      }
    }
  }
}

fn is_failure(status: &str) -> bool {
  let status = status.trim();
  FAILURE_STATUSES.iter().any(|f| f.eq_ignore_ascii_case(status))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strict_completed_policy() {
    let p = DispositionPolicy::default();
    assert_eq!(p.resolve(EventKind::Completed, Some("completed"), 20), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::Completed, Some("COMPLETED"), 16), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::Completed, Some("completed"), 15), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::Completed, Some("completed"), 5), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::Completed, Some("in-progress"), 60), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::Completed, None, 60), Resolution::MISSED);
  }

  #[test]
  fn lenient_completed_policy() {
    let p = DispositionPolicy::lenient();
    assert_eq!(p.resolve(EventKind::Completed, Some("completed"), 1), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::Completed, Some("in-progress"), 1), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::Completed, Some("completed"), 0), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::Completed, Some("Busy"), 30), Resolution::MISSED);
  }

  #[test]
  fn dial_outcome_ignores_duration() {
    let p = DispositionPolicy::default();
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("busy"), 0), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("No-Answer"), 0), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("canceled"), 0), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("failed"), 90), Resolution::MISSED);
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("completed"), 0), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::DialOutcome, Some("answered"), 0), Resolution::CONNECTED);
    assert_eq!(p.resolve(EventKind::DialOutcome, None, 0), Resolution::MISSED);
  }

  #[test]
  fn initiated_is_always_in_progress() {
    let p = DispositionPolicy::default();
    assert_eq!(p.resolve(EventKind::Initiated, None, 0), Resolution::IN_PROGRESS);
    assert_eq!(p.resolve(EventKind::Initiated, Some("busy"), 0), Resolution::IN_PROGRESS);
  }

  #[test]
  fn hubspot_vocabulary() {
    assert_eq!(Disposition::NoAnswer.to_string(), "NO_ANSWER");
    assert_eq!(Outcome::InProgress.to_string(), "IN_PROGRESS");
    assert_eq!(
      serde_json::to_string(&Disposition::Connected).unwrap(),
      "\"CONNECTED\""
    );
  }
}
