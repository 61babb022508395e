//! SQL schema for the Sasso SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per call leg already logged to the CRM.
-- Rows are only ever inserted or deleted by eviction, never updated.
CREATE TABLE IF NOT EXISTS processed_calls (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    subject       TEXT    NOT NULL,                   -- caller number
    call_id       TEXT    NOT NULL,
    timestamp_ms  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS processed_subject_call_idx
    ON processed_calls(subject, call_id);
CREATE INDEX IF NOT EXISTS processed_timestamp_idx
    ON processed_calls(timestamp_ms);

PRAGMA user_version = 1;
";
