//! [`JsonFileStore`], the file-backed implementation of [`IdempotencyStore`].

use std::path::{Path, PathBuf};

use sasso_core::{
  event::CallKey,
  ledger::{EvictionReport, Ledger, RetentionPolicy},
  store::{ClaimOutcome, IdempotencyStore, InFlight},
};
use tokio::{fs, io::AsyncWriteExt as _, sync::Mutex};
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Default)]
struct State {
  ledger:    Ledger,
  in_flight: InFlight,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An idempotency store persisted as a single JSON document.
///
/// One async mutex guards the in-memory ledger, the in-flight claims and the
/// file, so every read-modify-write is serialised within the process.
#[derive(Debug)]
pub struct JsonFileStore {
  path:   PathBuf,
  policy: RetentionPolicy,
  state:  Mutex<State>,
}

impl JsonFileStore {
  /// Load the document at `path`.
  ///
  /// Never fails: a missing, unreadable or corrupt document is logged and
  /// treated as an empty history.
  pub async fn open(path: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
    let path   = path.into();
    let ledger = load(&path).await;
    info!(path = %path.display(), records = ledger.len(), "opened idempotency store");
    Self {
      path,
      policy,
      state: Mutex::new(State { ledger, in_flight: InFlight::default() }),
    }
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Write `ledger` to a temporary sibling, flush it to disk, then rename it
  /// over the document.
  async fn persist(&self, ledger: &Ledger) -> Result<()> {
    let bytes = serde_json::to_vec(ledger)?;
    let tmp   = temp_path(&self.path);
    let io    = |path: &Path| {
      let path = path.to_path_buf();
      move |source: std::io::Error| Error::Io { path, source }
    };

    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).await.map_err(io(parent))?;
    }

    let mut file = fs::File::create(&tmp).await.map_err(io(&tmp))?;
    file.write_all(&bytes).await.map_err(io(&tmp))?;
    file.sync_all().await.map_err(io(&tmp))?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, &self.path).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(io(&self.path)(e));
    }
    Ok(())
  }
}

async fn load(path: &Path) -> Ledger {
  let bytes = match fs::read(path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ledger::new(),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "idempotency store unreadable; starting empty");
      return Ledger::new();
    }
  };

  match serde_json::from_slice(&bytes) {
    Ok(ledger) => ledger,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "idempotency store corrupt; starting empty");
      Ledger::new()
    }
  }
}

fn temp_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".tmp");
  path.with_file_name(name)
}

// ─── IdempotencyStore impl ───────────────────────────────────────────────────

impl IdempotencyStore for JsonFileStore {
  type Error = Error;

  async fn has(&self, subject: &str, call_id: &str) -> Result<bool> {
    Ok(self.state.lock().await.ledger.contains(subject, call_id))
  }

  async fn claim(&self, key: &CallKey) -> Result<ClaimOutcome> {
    let mut state = self.state.lock().await;
    let State { ledger, in_flight } = &mut *state;
    Ok(in_flight.claim(ledger, key))
  }

  async fn record(&self, key: &CallKey, timestamp_ms: i64) -> Result<()> {
    let mut state = self.state.lock().await;
    let State { ledger, in_flight } = &mut *state;
    in_flight.settle(ledger, key, timestamp_ms);
    // On failure the record stays in memory, so duplicates are still caught
    // until restart.
    self.persist(ledger).await
  }

  async fn evict(&self, now_ms: i64) -> Result<EvictionReport> {
    let mut state = self.state.lock().await;
    let report = state.ledger.evict(now_ms, &self.policy);
    if report.removed() > 0 {
      self.persist(&state.ledger).await?;
    }
    Ok(report)
  }

  async fn snapshot(&self) -> Result<Ledger> {
    Ok(self.state.lock().await.ledger.clone())
  }
}
