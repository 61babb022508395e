//! Outbound SMS through the Twilio REST API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::info;

use crate::{
  Error, Result,
  http::{RetryPolicy, build_client, expect_status, json},
};

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

#[derive(Debug, Clone)]
pub struct TwilioConfig {
  pub base_url:    String,
  pub account_sid: Option<String>,
  pub auth_token:  Option<String>,
  /// The Twilio number messages are sent from.
  pub from:        Option<String>,
  pub timeout:     Duration,
  pub retry:       RetryPolicy,
}

impl Default for TwilioConfig {
  fn default() -> Self {
    Self {
      base_url:    DEFAULT_BASE_URL.to_owned(),
      account_sid: None,
      auth_token:  None,
      from:        None,
      timeout:     Duration::from_secs(10),
      retry:       RetryPolicy::default(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct Message {
  sid: String,
}

#[derive(Clone)]
pub struct TwilioClient {
  client: Client,
  config: TwilioConfig,
}

fn required<'a>(value: &'a Option<String>, what: &'static str) -> Result<&'a str> {
  value.as_deref().filter(|v| !v.is_empty()).ok_or(Error::Unconfigured(what))
}

impl TwilioClient {
  pub fn new(config: TwilioConfig) -> Result<Self> {
    let client = build_client(config.timeout)?;
    Ok(Self { client, config })
  }

  /// `POST /2010-04-01/Accounts/<sid>/Messages.json`. Returns the message sid.
  pub async fn send_sms(&self, to: &str, body: &str) -> Result<String> {
    const OP: &str = "sms send";
    let sid   = required(&self.config.account_sid, "twilio account sid")?;
    let token = required(&self.config.auth_token, "twilio auth token")?;
    let from  = required(&self.config.from, "twilio phone")?;

    let url = format!(
      "{}/2010-04-01/Accounts/{}/Messages.json",
      self.config.base_url.trim_end_matches('/'),
      sid
    );
    let req = self
      .client
      .post(url)
      .basic_auth(sid, Some(token))
      .form(&[("To", to), ("From", from), ("Body", body)]);

    let resp = self.config.retry.send(OP, req).await?;
    let resp = expect_status(OP, resp, StatusCode::CREATED).await?;
    let message: Message = json(OP, resp).await?;
    info!(message_sid = %message.sid, "sent sms");
    Ok(message.sid)
  }
}
