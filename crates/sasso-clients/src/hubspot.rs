//! Async HTTP client for the HubSpot CRM v3 objects API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use sasso_core::crm::{CallLog, CrmClient, CrmError, LoggedCall};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
  Error, Result,
  http::{RetryPolicy, build_client, expect_status, json},
};

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

/// HubSpot's built-in call → contact association.
const CALL_TO_CONTACT: u32 = 194;

/// Connection settings for the HubSpot API.
#[derive(Debug, Clone)]
pub struct HubSpotConfig {
  pub base_url: String,
  /// Private-app access token. Without one nothing is sent.
  pub api_key:  Option<String>,
  pub timeout:  Duration,
  pub retry:    RetryPolicy,
}

impl Default for HubSpotConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_owned(),
      api_key:  None,
      timeout:  Duration::from_secs(10),
      retry:    RetryPolicy::default(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
  #[serde(default)]
  results: Vec<Object>,
}

#[derive(Debug, Deserialize)]
struct Object {
  id: String,
}

/// Async HTTP client for HubSpot contacts and call engagements.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HubSpotClient {
  client: Client,
  config: HubSpotConfig,
}

impl HubSpotClient {
  pub fn new(config: HubSpotConfig) -> Result<Self> {
    let client = build_client(config.timeout)?;
    Ok(Self { client, config })
  }

  pub fn is_configured(&self) -> bool {
    self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
  }

  fn url(&self, path: &str) -> String {
    format!("{}/crm/v3/objects{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn post(&self, path: &str) -> Result<RequestBuilder> {
    let key = self
      .config
      .api_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or(Error::Unconfigured("hubspot"))?;
    Ok(self.client.post(self.url(path)).bearer_auth(key))
  }

  // ── Contacts ──────────────────────────────────────────────────────────────

  /// `POST /crm/v3/objects/contacts/search` on `phone` or `mobilephone`.
  pub async fn find_contact(&self, phone: &str) -> Result<Option<String>> {
    const OP: &str = "contact search";
    let body = json!({
      "filterGroups": [
        { "filters": [{ "propertyName": "phone",       "operator": "EQ", "value": phone }] },
        { "filters": [{ "propertyName": "mobilephone", "operator": "EQ", "value": phone }] },
      ]
    });

    let resp = self.config.retry.send_read(OP, self.post("/contacts/search")?.json(&body)).await?;
    let resp = expect_status(OP, resp, StatusCode::OK).await?;
    let found: SearchResults = json(OP, resp).await?;
    Ok(found.results.into_iter().next().map(|o| o.id))
  }

  /// `POST /crm/v3/objects/contacts`: a placeholder contact for an unknown
  /// caller.
  pub async fn create_contact(&self, phone: &str) -> Result<String> {
    const OP: &str = "contact create";
    let body = json!({
      "properties": { "phone": phone, "firstname": "Unknown", "lastname": "Caller" }
    });

    let resp = self.config.retry.send(OP, self.post("/contacts")?.json(&body)).await?;
    let resp = expect_status(OP, resp, StatusCode::CREATED).await?;
    let created: Object = json(OP, resp).await?;
    info!(contact_id = %created.id, "created hubspot contact");
    Ok(created.id)
  }

  /// Search, then create on a miss.
  pub async fn resolve_contact(&self, phone: &str) -> Result<String> {
    match self.find_contact(phone).await? {
      Some(id) => {
        debug!(contact_id = %id, "matched hubspot contact");
        Ok(id)
      }
      None => self.create_contact(phone).await,
    }
  }

  // ── Calls ─────────────────────────────────────────────────────────────────

  /// `POST /crm/v3/objects/calls`, associated with `contact_id`.
  pub async fn create_call(&self, contact_id: &str, log: &CallLog) -> Result<Option<String>> {
    const OP: &str = "call create";
    let body = json!({
      "properties": {
        "hs_call_body":        format!("Incoming call from {}", log.subject),
        "hs_call_direction":   "INBOUND",
        "hs_call_disposition": log.disposition.to_string(),
        "hs_call_duration":    log.duration_ms().to_string(),
        "hs_call_from_number": log.subject,
        "hs_call_status":      log.outcome.to_string(),
        "hs_timestamp":        log.timestamp_ms.to_string(),
      },
      "associations": [{
        "to":    { "id": contact_id },
        "types": [{ "associationCategory": "HUBSPOT_DEFINED", "associationTypeId": CALL_TO_CONTACT }],
      }],
    });

    let resp = self.config.retry.send(OP, self.post("/calls")?.json(&body)).await?;
    let resp = expect_status(OP, resp, StatusCode::CREATED).await?;
    // The id is informational; a 201 without one still counts.
    let created: Option<Object> = resp.json().await.ok();
    Ok(created.map(|o| o.id))
  }
}

impl From<Error> for CrmError {
  fn from(e: Error) -> Self {
    match e {
      Error::Unconfigured(_) => CrmError::Unconfigured,
      Error::Exhausted { attempts, message, .. } => CrmError::Transient { attempts, message },
      Error::Status { operation, status, body } => CrmError::Rejected { operation, status, body },
      other => CrmError::Protocol(other.to_string()),
    }
  }
}

impl CrmClient for HubSpotClient {
  async fn log_call(&self, log: &CallLog) -> Result<LoggedCall, CrmError> {
    if !self.is_configured() {
      return Err(CrmError::Unconfigured);
    }
    let contact_id = self.resolve_contact(&log.subject).await?;
    if contact_id.is_empty() {
      return Err(CrmError::NoContact(log.subject.clone()));
    }
    let call_id    = self.create_call(&contact_id, log).await?;
    info!(
      contact_id = %contact_id,
      disposition = %log.disposition,
      outcome = %log.outcome,
      "logged call to hubspot"
    );
    Ok(LoggedCall { contact_id, call_id })
  }
}
