//! [`SqliteStore`], the SQLite implementation of [`IdempotencyStore`].

use std::{path::Path, sync::Arc};

use rusqlite::OptionalExtension as _;
use sasso_core::{
  event::CallKey,
  ledger::{EvictionReport, Ledger, ProcessedRecord, RetentionPolicy},
  store::{ClaimOutcome, IdempotencyStore, InFlight},
};
use tokio::sync::Mutex;

use crate::{Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An idempotency store backed by a single SQLite file.
///
/// Cloning is cheap: the connection and the claim set are
/// reference-counted. The claim mutex doubles as the writer lock: `claim`,
/// `record` and `evict` all hold it for their whole database round trip.
#[derive(Clone)]
pub struct SqliteStore {
  conn:      tokio_rusqlite::Connection,
  policy:    RetentionPolicy,
  in_flight: Arc<Mutex<InFlight>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, policy: RetentionPolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, policy).await
  }

  /// Open an in-memory store, useful for testing, and as the empty-history
  /// fallback when the database file cannot be opened.
  pub async fn open_in_memory(policy: RetentionPolicy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, policy).await
  }

  async fn init(conn: tokio_rusqlite::Connection, policy: RetentionPolicy) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, policy, in_flight: Arc::default() })
  }

  /// The first of the key's identifiers with a processed row, call id first.
  async fn find_processed(&self, key: &CallKey) -> Result<Option<String>> {
    let subject   = key.subject.clone();
    let call_id   = key.call_id.clone();
    let parent_id = key.parent_id.clone().unwrap_or_else(|| call_id.clone());

    let matched: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT call_id FROM processed_calls
             WHERE subject = ?1 AND call_id IN (?2, ?3)
             ORDER BY call_id = ?2 DESC
             LIMIT 1",
            rusqlite::params![subject, call_id, parent_id],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(matched)
  }
}

// ─── IdempotencyStore impl ───────────────────────────────────────────────────

impl IdempotencyStore for SqliteStore {
  type Error = crate::Error;

  async fn has(&self, subject: &str, call_id: &str) -> Result<bool> {
    let subject = subject.to_owned();
    let call_id = call_id.to_owned();

    let found = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM processed_calls WHERE subject = ?1 AND call_id = ?2 LIMIT 1",
            rusqlite::params![subject, call_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;
    Ok(found)
  }

  async fn claim(&self, key: &CallKey) -> Result<ClaimOutcome> {
    let mut in_flight = self.in_flight.lock().await;

    if let Some(matched) = self.find_processed(key).await? {
      return Ok(ClaimOutcome::Processed { matched });
    }
    if let Some(matched) = in_flight.find(key) {
      return Ok(ClaimOutcome::InFlight { matched: matched.to_owned() });
    }
    in_flight.insert(key);
    Ok(ClaimOutcome::Granted)
  }

  async fn record(&self, key: &CallKey, timestamp_ms: i64) -> Result<()> {
    let mut in_flight = self.in_flight.lock().await;

    let subject = key.subject.clone();
    let ids: Vec<String> = key.ids().map(str::to_owned).collect();
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO processed_calls (subject, call_id, timestamp_ms)
             SELECT ?1, ?2, ?3
             WHERE NOT EXISTS (
               SELECT 1 FROM processed_calls WHERE subject = ?1 AND call_id = ?2
             )",
          )?;
          for call_id in &ids {
            stmt.execute(rusqlite::params![subject, call_id, timestamp_ms])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await;

    in_flight.remove(key);
    Ok(inserted?)
  }

  async fn evict(&self, now_ms: i64) -> Result<EvictionReport> {
    let _writer = self.in_flight.lock().await;

    let cutoff      = self.policy.cutoff_ms(now_ms);
    let max_records = i64::try_from(self.policy.max_records)?;

    let (expired, trimmed) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let expired = tx.execute(
          "DELETE FROM processed_calls WHERE timestamp_ms < ?1",
          rusqlite::params![cutoff],
        )?;
        let trimmed = tx.execute(
          "DELETE FROM processed_calls WHERE seq IN (
             SELECT seq FROM (
               SELECT seq, ROW_NUMBER() OVER (
                 PARTITION BY subject ORDER BY timestamp_ms DESC, seq DESC
               ) AS rn
               FROM processed_calls
             )
             WHERE rn > ?1
           )",
          rusqlite::params![max_records],
        )?;
        tx.commit()?;
        Ok((expired, trimmed))
      })
      .await?;

    Ok(EvictionReport { expired, trimmed })
  }

  async fn snapshot(&self) -> Result<Ledger> {
    let rows: Vec<(String, ProcessedRecord)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT subject, call_id, timestamp_ms FROM processed_calls ORDER BY seq",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok((row.get(0)?, ProcessedRecord::new(row.get::<_, String>(1)?, row.get(2)?)))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows.into_iter().collect())
  }
}
