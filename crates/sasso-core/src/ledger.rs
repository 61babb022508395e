//! The processed-call ledger shared by every store backend.
//!
//! Persisted layout: a JSON object mapping each subject to its records in
//! insertion order, e.g. `{"+15551234567": [{"callId": "CA…",
//! "timestampMillis": 1700000000000}]}`.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

// ─── Record ──────────────────────────────────────────────────────────────────

/// A call leg that has already produced a downstream log entry. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
  #[serde(rename = "callId")]
  pub call_id:      String,
  #[serde(rename = "timestampMillis")]
  pub timestamp_ms: i64,
}

impl ProcessedRecord {
  pub fn new(call_id: impl Into<String>, timestamp_ms: i64) -> Self {
    Self { call_id: call_id.into(), timestamp_ms }
  }
}

// ─── Retention ───────────────────────────────────────────────────────────────

/// Bounds applied by [`Ledger::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
  /// Records older than this, measured from `timestamp_ms`, are dropped.
  pub retention:   TimeDelta,
  /// Per-subject cap; the oldest records go first.
  pub max_records: usize,
}

impl Default for RetentionPolicy {
  fn default() -> Self {
    Self { retention: TimeDelta::days(7), max_records: 100 }
  }
}

impl RetentionPolicy {
  pub fn new(retention_days: u32, max_records: usize) -> Self {
    Self {
      retention: TimeDelta::days(i64::from(retention_days)),
      max_records,
    }
  }

  /// Records with a timestamp strictly below this are expired at `now_ms`.
  pub fn cutoff_ms(&self, now_ms: i64) -> i64 {
    now_ms.saturating_sub(self.retention.num_milliseconds())
  }
}

/// What a single eviction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
  pub expired: usize,
  pub trimmed: usize,
}

impl EvictionReport {
  pub fn removed(&self) -> usize { self.expired + self.trimmed }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Mapping from subject to its processed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
  subjects: BTreeMap<String, Vec<ProcessedRecord>>,
}

impl Ledger {
  pub fn new() -> Self { Self::default() }

  /// True if `call_id` has a record under `subject`.
  pub fn contains(&self, subject: &str, call_id: &str) -> bool {
    self.records(subject).iter().any(|r| r.call_id == call_id)
  }

  /// The first of `ids` that has a record under `subject`.
  pub fn find_any<'a>(
    &self,
    subject: &str,
    ids: impl IntoIterator<Item = &'a str>,
  ) -> Option<&'a str> {
    let records = self.records(subject);
    ids
      .into_iter()
      .find(|id| records.iter().any(|r| r.call_id == *id))
  }

  pub fn push(&mut self, subject: &str, record: ProcessedRecord) {
    self.subjects.entry(subject.to_owned()).or_default().push(record);
  }

  /// Records for `subject` in insertion order.
  pub fn records(&self, subject: &str) -> &[ProcessedRecord] {
    self.subjects.get(subject).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn subjects(&self) -> impl Iterator<Item = (&str, &[ProcessedRecord])> {
    self.subjects.iter().map(|(s, r)| (s.as_str(), r.as_slice()))
  }

  /// Total number of records across all subjects.
  pub fn len(&self) -> usize { self.subjects.values().map(Vec::len).sum() }

  pub fn is_empty(&self) -> bool { self.subjects.is_empty() }

  /// Drop expired records, then trim each subject to the newest
  /// `max_records`. Surviving records keep their insertion order and empty
  /// subjects are removed.
  pub fn evict(&mut self, now_ms: i64, policy: &RetentionPolicy) -> EvictionReport {
    let cutoff = policy.cutoff_ms(now_ms);
    let mut report = EvictionReport::default();

    for records in self.subjects.values_mut() {
      let before = records.len();
      records.retain(|r| r.timestamp_ms >= cutoff);
      report.expired += before - records.len();

      if records.len() > policy.max_records {
        let excess = records.len() - policy.max_records;
        // Rank by (timestamp, position) so ties fall back to insertion order.
        let mut ranked: Vec<(i64, usize)> = records
          .iter()
          .enumerate()
          .map(|(i, r)| (r.timestamp_ms, i))
          .collect();
        ranked.sort_unstable();
        let mut doomed = vec![false; records.len()];
        for &(_, i) in &ranked[..excess] {
          doomed[i] = true;
        }
        let mut idx = 0;
        records.retain(|_| {
          let keep = !doomed[idx];
          idx += 1;
          keep
        });
        report.trimmed += excess;
      }
    }

    self.subjects.retain(|_, records| !records.is_empty());
    report
  }
}

impl FromIterator<(String, ProcessedRecord)> for Ledger {
  fn from_iter<I: IntoIterator<Item = (String, ProcessedRecord)>>(iter: I) -> Self {
    let mut ledger = Ledger::new();
    for (subject, record) in iter {
      ledger.push(&subject, record);
    }
    ledger
  }
}
