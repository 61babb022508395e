//! Runtime server configuration, deserialised from `config.toml` and
//! `SASSO_*` environment variables.

use std::{path::PathBuf, time::Duration};

use sasso_clients::{
  http::RetryPolicy,
  hubspot::{self, HubSpotConfig},
  stripe::{self, StripeConfig},
  twilio::{self, TwilioConfig},
};
use sasso_core::{
  disposition::{CompletionRule, DispositionPolicy},
  hours::BusinessHours,
  ledger::RetentionPolicy,
  reconcile::EvictionCadence,
};
use serde::Deserialize;

use crate::twiml::DialSettings;

/// Which [`IdempotencyStore`](sasso_core::store::IdempotencyStore) backs the
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  #[default]
  Json,
  Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,

  // ── Idempotency store ─────────────────────────────────────────────────────
  pub store_backend:           StoreBackend,
  pub store_path:              PathBuf,
  pub retention_days:          u32,
  pub max_records_per_subject: usize,
  /// Successful records between eviction passes; 0 disables them.
  pub eviction_every:          u32,

  // ── Disposition ───────────────────────────────────────────────────────────
  pub connected_threshold_seconds: u64,
  pub completion_rule:             CompletionRule,

  // ── Outbound HTTP ─────────────────────────────────────────────────────────
  pub http_timeout_secs: u64,
  pub http_max_attempts: u32,
  pub retry_backoff_ms:  u64,

  pub hubspot_base_url: String,
  pub hubspot_api_key:  Option<String>,

  // ── Phone menu ────────────────────────────────────────────────────────────
  /// Comma-separated E.164 numbers dialed in parallel.
  pub technician_numbers:   String,
  pub dial_timeout_secs:    u32,
  pub dial_time_limit_secs: u32,
  pub menu_enabled:         bool,
  pub business_timezone:    String,
  pub business_open_hour:   u32,
  pub business_close_hour:  u32,

  pub twilio_account_sid: Option<String>,
  pub twilio_auth_token:  Option<String>,
  pub twilio_phone:       Option<String>,
  pub twilio_base_url:    String,

  pub stripe_secret_key:    Option<String>,
  pub stripe_price_id:      Option<String>,
  pub stripe_base_url:      String,
  pub checkout_success_url: String,
  pub checkout_cancel_url:  String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let checkout = StripeConfig::default();
    Self {
      host:                        "0.0.0.0".to_owned(),
      port:                        5000,
      store_backend:               StoreBackend::default(),
      store_path:                  PathBuf::from("processed_calls.json"),
      retention_days:              7,
      max_records_per_subject:     100,
      eviction_every:              10,
      connected_threshold_seconds: 15,
      completion_rule:             CompletionRule::default(),
      http_timeout_secs:           10,
      http_max_attempts:           3,
      retry_backoff_ms:            500,
      hubspot_base_url:            hubspot::DEFAULT_BASE_URL.to_owned(),
      hubspot_api_key:             None,
      technician_numbers:          String::new(),
      dial_timeout_secs:           30,
      dial_time_limit_secs:        600,
      menu_enabled:                true,
      business_timezone:           "America/New_York".to_owned(),
      business_open_hour:          8,
      business_close_hour:         19,
      twilio_account_sid:          None,
      twilio_auth_token:           None,
      twilio_phone:                None,
      twilio_base_url:             twilio::DEFAULT_BASE_URL.to_owned(),
      stripe_secret_key:           None,
      stripe_price_id:             None,
      stripe_base_url:             stripe::DEFAULT_BASE_URL.to_owned(),
      checkout_success_url:        checkout.success_url,
      checkout_cancel_url:         checkout.cancel_url,
    }
  }
}

impl ServerConfig {
  pub fn retention(&self) -> RetentionPolicy {
    RetentionPolicy::new(self.retention_days, self.max_records_per_subject)
  }

  pub fn disposition(&self) -> DispositionPolicy {
    DispositionPolicy {
      connected_threshold_seconds: self.connected_threshold_seconds,
      completion_rule:             self.completion_rule,
    }
  }

  pub fn cadence(&self) -> EvictionCadence { EvictionCadence::new(self.eviction_every) }

  pub fn business_hours(&self) -> sasso_core::Result<BusinessHours> {
    BusinessHours::new(
      &self.business_timezone,
      self.business_open_hour,
      self.business_close_hour,
    )
  }

  pub fn dial(&self) -> DialSettings {
    DialSettings {
      timeout_secs:    self.dial_timeout_secs,
      time_limit_secs: self.dial_time_limit_secs,
    }
  }

  fn timeout(&self) -> Duration { Duration::from_secs(self.http_timeout_secs) }

  pub fn retry(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.http_max_attempts,
      backoff:      Duration::from_millis(self.retry_backoff_ms),
    }
  }

  pub fn hubspot(&self) -> HubSpotConfig {
    HubSpotConfig {
      base_url: self.hubspot_base_url.clone(),
      api_key:  self.hubspot_api_key.clone(),
      timeout:  self.timeout(),
      retry:    self.retry(),
    }
  }

  pub fn stripe(&self) -> StripeConfig {
    StripeConfig {
      base_url:    self.stripe_base_url.clone(),
      secret_key:  self.stripe_secret_key.clone(),
      price_id:    self.stripe_price_id.clone(),
      success_url: self.checkout_success_url.clone(),
      cancel_url:  self.checkout_cancel_url.clone(),
      timeout:     self.timeout(),
      retry:       self.retry(),
    }
  }

  pub fn twilio(&self) -> TwilioConfig {
    TwilioConfig {
      base_url:    self.twilio_base_url.clone(),
      account_sid: self.twilio_account_sid.clone(),
      auth_token:  self.twilio_auth_token.clone(),
      from:        self.twilio_phone.clone(),
      timeout:     self.timeout(),
      retry:       self.retry(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_values() {
    let cfg = ServerConfig::default();
    assert_eq!(cfg.port, 5000);
    assert_eq!(cfg.store_backend, StoreBackend::Json);
    assert_eq!(cfg.retention(), RetentionPolicy::default());
    assert_eq!(cfg.disposition(), DispositionPolicy::default());
    assert_eq!(cfg.retry(), RetryPolicy::default());
    assert_eq!(cfg.business_hours().unwrap(), BusinessHours::default());
  }

  #[test]
  fn layered_sources_override_defaults() {
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(
        "port = 8080\nstore_backend = \"sqlite\"\ncompletion_rule = \"exclude_failures\"",
        config::FileFormat::Toml,
      ))
      .set_override("technician_numbers", "+15550001111,+15550002222")
      .unwrap()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.store_backend, StoreBackend::Sqlite);
    assert_eq!(cfg.completion_rule, CompletionRule::ExcludeFailures);
    assert_eq!(cfg.technician_numbers, "+15550001111,+15550002222");
    assert!(cfg.menu_enabled);
  }
}
