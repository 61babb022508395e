//! Call Event Reconciler. Turns webhook deliveries into at most one CRM
//! call log per call.
//!
//! ```text
//! Initiated ───────────────► submit (IN_PROGRESS)            never recorded
//! DialOutcome / Completed ─► claim(call_id, parent_id)
//!                              ├─ Processed / InFlight ─► discard
//!                              └─ Granted ─► submit ─► record ─► maybe evict
//! ```
//!
//! The claim is taken and released under the store's lock; the CRM round
//! trip in between runs unlocked. A failed submission is still recorded, so
//! a call is attempted at most once even through a CRM outage.

use std::sync::{
  Arc,
  atomic::{AtomicU32, Ordering},
};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
  crm::{CallLog, CrmClient},
  disposition::{DispositionPolicy, Resolution},
  event::{CallEvent, EventKind},
  store::{ClaimOutcome, IdempotencyStore},
};

// ─── Eviction cadence ────────────────────────────────────────────────────────

/// Counts successful records and fires every `every`-th one. Zero disables
/// opportunistic eviction.
#[derive(Debug)]
pub struct EvictionCadence {
  every: u32,
  count: AtomicU32,
}

impl EvictionCadence {
  pub fn new(every: u32) -> Self { Self { every, count: AtomicU32::new(0) } }

  pub fn tick(&self) -> bool {
    if self.every == 0 {
      return false;
    }
    let n = self.count.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    n % self.every == 0
  }
}

impl Default for EvictionCadence {
  fn default() -> Self { Self::new(10) }
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// The terminal state a delivery reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
  /// An `Initiated` event: submitted, deliberately not recorded.
  Informational { resolution: Resolution, delivered: bool },
  /// A terminal event submitted once and recorded. `persisted` is false
  /// when the store could not make the record durable.
  Recorded { resolution: Resolution, delivered: bool, persisted: bool },
  /// Already reconciled, or being reconciled by a concurrent delivery.
  Duplicate { matched: String, in_flight: bool },
}

impl Reconciliation {
  pub fn is_duplicate(&self) -> bool { matches!(self, Self::Duplicate { .. }) }

  pub fn resolution(&self) -> Option<Resolution> {
    match self {
      Self::Informational { resolution, .. } | Self::Recorded { resolution, .. } => {
        Some(*resolution)
      }
      Self::Duplicate { .. } => None,
    }
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

pub struct Reconciler<S, C> {
  store:   Arc<S>,
  crm:     Arc<C>,
  policy:  DispositionPolicy,
  cadence: EvictionCadence,
}

impl<S, C> Reconciler<S, C>
where
  S: IdempotencyStore,
  C: CrmClient,
{
  pub fn new(store: Arc<S>, crm: Arc<C>) -> Self {
    Self {
      store,
      crm,
      policy: DispositionPolicy::default(),
      cadence: EvictionCadence::default(),
    }
  }

  pub fn with_policy(mut self, policy: DispositionPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_cadence(mut self, cadence: EvictionCadence) -> Self {
    self.cadence = cadence;
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn policy(&self) -> &DispositionPolicy { &self.policy }

  /// Reconcile one delivery. Never fails: CRM and storage faults are logged
  /// and reflected in the returned [`Reconciliation`].
  pub async fn reconcile(&self, event: &CallEvent) -> Reconciliation {
    let resolution = self.policy.resolve_event(event);

    if event.kind == EventKind::Initiated {
      let delivered = self.submit(event, resolution).await;
      return Reconciliation::Informational { resolution, delivered };
    }

    let key = event.key();
    match self.store.claim(&key).await {
      Ok(ClaimOutcome::Granted) => {}
      Ok(ClaimOutcome::Processed { matched }) => {
        info!(
          subject = %event.subject,
          call_id = %event.call_id,
          matched = %matched,
          kind = %event.kind,
          "discarding already reconciled call"
        );
        return Reconciliation::Duplicate { matched, in_flight: false };
      }
      Ok(ClaimOutcome::InFlight { matched }) => {
        info!(
          subject = %event.subject,
          call_id = %event.call_id,
          matched = %matched,
          kind = %event.kind,
          "discarding call already being reconciled"
        );
        return Reconciliation::Duplicate { matched, in_flight: true };
      }
      Err(e) => {
        // Duplicate suppression is best-effort when storage is down.
        error!(
          subject = %event.subject,
          call_id = %event.call_id,
          error = %e,
          "idempotency check failed; proceeding without it"
        );
      }
    }

    let delivered = self.submit(event, resolution).await;

    let now_ms = Utc::now().timestamp_millis();
    let persisted = match self.store.record(&key, now_ms).await {
      Ok(()) => true,
      Err(e) => {
        error!(
          subject = %event.subject,
          call_id = %event.call_id,
          error = %e,
          "failed to persist processed call"
        );
        false
      }
    };

    if persisted && self.cadence.tick() {
      self.evict(now_ms).await;
    }

    Reconciliation::Recorded { resolution, delivered, persisted }
  }

  async fn submit(&self, event: &CallEvent, resolution: Resolution) -> bool {
    let log = CallLog::new(
      event.subject.clone(),
      event.duration_seconds,
      event.observed_at_ms,
      resolution,
    );

    match self.crm.log_call(&log).await {
      Ok(logged) => {
        info!(
          subject = %event.subject,
          call_id = %event.call_id,
          kind = %event.kind,
          disposition = %resolution.disposition,
          outcome = %resolution.outcome,
          contact_id = %logged.contact_id,
          "logged call to crm"
        );
        true
      }
      Err(e) if e.is_transient() => {
        warn!(
          subject = %event.subject,
          call_id = %event.call_id,
          error = %e,
          "crm unavailable; call will not be retried"
        );
        false
      }
      Err(e) => {
        error!(
          subject = %event.subject,
          call_id = %event.call_id,
          error = %e,
          "crm submission failed"
        );
        false
      }
    }
  }

  async fn evict(&self, now_ms: i64) {
    match self.store.evict(now_ms).await {
      Ok(report) => debug!(
        expired = report.expired,
        trimmed = report.trimmed,
        "evicted processed calls"
      ),
      Err(e) => warn!(error = %e, "eviction failed"),
    }
  }
}
