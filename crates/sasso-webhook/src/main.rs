//! sasso-webhook server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `SASSO_*` environment variables, opens the configured idempotency store,
//! and serves the Twilio webhooks over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use sasso_clients::{
  billing::Billing, hubspot::HubSpotClient, stripe::StripeClient, twilio::TwilioClient,
};
use sasso_core::{hours::BusinessHours, reconcile::Reconciler, store::IdempotencyStore};
use sasso_store_json::JsonFileStore;
use sasso_store_sqlite::SqliteStore;
use sasso_webhook::{AppState, ServerConfig, StoreBackend};
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sasso Twilio webhook server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SASSO"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let hours = server_cfg.business_hours().context("invalid business hours")?;

  let crm = HubSpotClient::new(server_cfg.hubspot()).context("failed to build HubSpot client")?;
  if !crm.is_configured() {
    warn!("hubspot_api_key is not set; calls will not be logged to the CRM");
  }
  let billing = Billing::new(
    StripeClient::new(server_cfg.stripe()).context("failed to build Stripe client")?,
    TwilioClient::new(server_cfg.twilio()).context("failed to build Twilio client")?,
  );

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  let retention  = server_cfg.retention();

  match server_cfg.store_backend {
    StoreBackend::Json => {
      let store = JsonFileStore::open(&store_path, retention).await;
      serve(store, crm, billing, hours, server_cfg).await
    }
    StoreBackend::Sqlite => {
      let store = match SqliteStore::open(&store_path, retention).await {
        Ok(store) => store,
        Err(e) => {
          error!(
            path = %store_path.display(),
            error = %e,
            "failed to open store; falling back to an empty in-memory database"
          );
          SqliteStore::open_in_memory(retention)
            .await
            .context("failed to open in-memory store")?
        }
      };
      serve(store, crm, billing, hours, server_cfg).await
    }
  }
}

async fn serve<S>(
  store: S,
  crm: HubSpotClient,
  billing: Billing,
  hours: BusinessHours,
  server_cfg: ServerConfig,
) -> anyhow::Result<()>
where
  S: IdempotencyStore + 'static,
{
  let store = Arc::new(store);
  match store.evict(Utc::now().timestamp_millis()).await {
    Ok(report) => info!(
      expired = report.expired,
      trimmed = report.trimmed,
      "startup eviction complete"
    ),
    Err(e) => warn!(error = %e, "startup eviction failed"),
  }

  let reconciler = Reconciler::new(store, Arc::new(crm))
    .with_policy(server_cfg.disposition())
    .with_cadence(server_cfg.cadence());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state   = AppState::new(reconciler, billing, hours, server_cfg);
  let app     = sasso_webhook::router(state);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
