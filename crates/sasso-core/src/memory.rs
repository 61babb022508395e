//! [`MemoryStore`]: a non-durable [`IdempotencyStore`] for tests and for
//! running without a persistence medium.

use std::{
  convert::Infallible,
  sync::{Mutex, MutexGuard},
};

use crate::{
  event::CallKey,
  ledger::{EvictionReport, Ledger, RetentionPolicy},
  store::{ClaimOutcome, IdempotencyStore, InFlight},
};

#[derive(Debug, Default)]
struct State {
  ledger:    Ledger,
  in_flight: InFlight,
}

/// Keeps the ledger in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
  policy: RetentionPolicy,
  state:  Mutex<State>,
}

impl MemoryStore {
  pub fn new(policy: RetentionPolicy) -> Self {
    Self { policy, state: Mutex::default() }
  }

  /// Start from an existing ledger.
  pub fn with_ledger(policy: RetentionPolicy, ledger: Ledger) -> Self {
    Self {
      policy,
      state: Mutex::new(State { ledger, in_flight: InFlight::default() }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // A panic while holding the lock cannot leave the ledger half-written.
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl IdempotencyStore for MemoryStore {
  type Error = Infallible;

  async fn has(&self, subject: &str, call_id: &str) -> Result<bool, Infallible> {
    Ok(self.lock().ledger.contains(subject, call_id))
  }

  async fn claim(&self, key: &CallKey) -> Result<ClaimOutcome, Infallible> {
    let mut state = self.lock();
    let State { ledger, in_flight } = &mut *state;
    Ok(in_flight.claim(ledger, key))
  }

  async fn record(&self, key: &CallKey, timestamp_ms: i64) -> Result<(), Infallible> {
    let mut state = self.lock();
    let State { ledger, in_flight } = &mut *state;
    in_flight.settle(ledger, key, timestamp_ms);
    Ok(())
  }

  async fn evict(&self, now_ms: i64) -> Result<EvictionReport, Infallible> {
    Ok(self.lock().ledger.evict(now_ms, &self.policy))
  }

  async fn snapshot(&self) -> Result<Ledger, Infallible> {
    Ok(self.lock().ledger.clone())
  }
}
