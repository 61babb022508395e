//! The `IdempotencyStore` trait and the in-flight claim bookkeeping shared
//! by its implementations.
//!
//! The trait is implemented by storage backends (`sasso-store-json`,
//! `sasso-store-sqlite`, and [`MemoryStore`](crate::memory::MemoryStore)).
//! The reconciler depends on this abstraction and never touches a lock.

use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use crate::{
  event::CallKey,
  ledger::{EvictionReport, Ledger, ProcessedRecord},
};

// ─── Claims ──────────────────────────────────────────────────────────────────

/// Result of [`IdempotencyStore::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
  /// No record or claim matched; the caller now owns this call until it
  /// calls [`IdempotencyStore::record`].
  Granted,
  /// `matched` already has a processed record.
  Processed { matched: String },
  /// `matched` is claimed by a delivery that has not recorded yet.
  InFlight { matched: String },
}

impl ClaimOutcome {
  pub fn is_granted(&self) -> bool { matches!(self, Self::Granted) }
}

/// In-memory set of claimed identifiers, keyed by subject.
///
/// Backends keep one of these behind the same lock that guards their
/// ledger so that check, claim and record are serialised together.
#[derive(Debug, Default)]
pub struct InFlight {
  by_subject: HashMap<String, HashSet<String>>,
}

impl InFlight {
  pub fn find<'a>(&self, key: &'a CallKey) -> Option<&'a str> {
    let claimed = self.by_subject.get(&key.subject)?;
    key.ids().find(|id| claimed.contains(*id))
  }

  pub fn insert(&mut self, key: &CallKey) {
    let claimed = self.by_subject.entry(key.subject.clone()).or_default();
    claimed.extend(key.ids().map(str::to_owned));
  }

  pub fn remove(&mut self, key: &CallKey) {
    if let Some(claimed) = self.by_subject.get_mut(&key.subject) {
      for id in key.ids() {
        claimed.remove(id);
      }
      if claimed.is_empty() {
        self.by_subject.remove(&key.subject);
      }
    }
  }

  pub fn is_empty(&self) -> bool { self.by_subject.is_empty() }

  /// Decide a claim against `ledger` and, when granted, register it.
  pub fn claim(&mut self, ledger: &Ledger, key: &CallKey) -> ClaimOutcome {
    if let Some(matched) = ledger.find_any(&key.subject, key.ids()) {
      return ClaimOutcome::Processed { matched: matched.to_owned() };
    }
    if let Some(matched) = self.find(key) {
      return ClaimOutcome::InFlight { matched: matched.to_owned() };
    }
    self.insert(key);
    ClaimOutcome::Granted
  }

  /// Append a record for every identifier of `key` not yet in `ledger`, then
  /// release the claim. Sibling legs share a parent, so the parent must be
  /// recorded alongside the leg that settled it.
  pub fn settle(&mut self, ledger: &mut Ledger, key: &CallKey, timestamp_ms: i64) {
    for id in key.ids() {
      if !ledger.contains(&key.subject, id) {
        ledger.push(&key.subject, ProcessedRecord::new(id, timestamp_ms));
      }
    }
    self.remove(key);
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistent mapping from subject to the call legs already logged to the
/// CRM.
///
/// Every mutation is serialised through one writer lock owned by the
/// implementation. [`claim`](Self::claim) and [`record`](Self::record) each
/// take that lock, so two deliveries for the same call can never both be
/// granted, while the CRM round trip between them runs unlocked.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait IdempotencyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// True if `call_id` has a processed record under `subject`.
  fn has<'a>(
    &'a self,
    subject: &'a str,
    call_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Atomically check `key.call_id` and `key.parent_id` against processed
  /// records and outstanding claims, claiming both when neither matches.
  fn claim<'a>(
    &'a self,
    key: &'a CallKey,
  ) -> impl Future<Output = Result<ClaimOutcome, Self::Error>> + Send + 'a;

  /// Append a record for `key.call_id` and `key.parent_id`, persist the
  /// store, and release any claim held on `key`. An error means the record was not made durable;
  /// the claim is still released.
  fn record<'a>(
    &'a self,
    key: &'a CallKey,
    timestamp_ms: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove records past the retention window, trim each subject to the
  /// configured maximum, and persist the result.
  fn evict(
    &self,
    now_ms: i64,
  ) -> impl Future<Output = Result<EvictionReport, Self::Error>> + Send + '_;

  /// A copy of every processed record.
  fn snapshot(&self) -> impl Future<Output = Result<Ledger, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn claim_matches_records_then_claims() {
    let mut ledger = Ledger::new();
    ledger.push("+1", ProcessedRecord::new("A", 0));
    let mut in_flight = InFlight::default();

    let dup = CallKey::new("+1", "B").with_parent("A");
    assert_eq!(
      in_flight.claim(&ledger, &dup),
      ClaimOutcome::Processed { matched: "A".into() }
    );
    assert!(in_flight.is_empty());

    let fresh = CallKey::new("+1", "C").with_parent("D");
    assert!(in_flight.claim(&ledger, &fresh).is_granted());

    let related = CallKey::new("+1", "D");
    assert_eq!(
      in_flight.claim(&ledger, &related),
      ClaimOutcome::InFlight { matched: "D".into() }
    );

    let other_subject = CallKey::new("+2", "D");
    assert!(in_flight.claim(&ledger, &other_subject).is_granted());

    in_flight.remove(&fresh);
    in_flight.remove(&other_subject);
    assert!(in_flight.is_empty());
  }

  #[test]
  fn settle_records_the_parent_once() {
    let mut ledger = Ledger::new();
    let mut in_flight = InFlight::default();

    let first = CallKey::new("+1", "B1").with_parent("A");
    assert!(in_flight.claim(&ledger, &first).is_granted());
    in_flight.settle(&mut ledger, &first, 5);
    assert!(in_flight.is_empty());

    let ids: Vec<_> = ledger.records("+1").iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, ["B1", "A"]);

    let sibling = CallKey::new("+1", "B2").with_parent("A");
    assert_eq!(
      in_flight.claim(&ledger, &sibling),
      ClaimOutcome::Processed { matched: "A".into() }
    );

    // Settling without a granted claim does not duplicate a known id.
    in_flight.settle(&mut ledger, &sibling, 6);
    assert_eq!(ledger.records("+1").len(), 3);
  }
}
