//! Async HTTP client for the handful of Stripe endpoints the phone menu uses.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::{
  Error, Result,
  http::{RetryPolicy, build_client, expect_status, json},
};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeConfig {
  pub base_url:    String,
  pub secret_key:  Option<String>,
  /// The recurring price a checkout session subscribes to.
  pub price_id:    Option<String>,
  pub success_url: String,
  pub cancel_url:  String,
  pub timeout:     Duration,
  pub retry:       RetryPolicy,
}

impl Default for StripeConfig {
  fn default() -> Self {
    Self {
      base_url:    DEFAULT_BASE_URL.to_owned(),
      secret_key:  None,
      price_id:    None,
      success_url: "https://example.com/success".to_owned(),
      cancel_url:  "https://example.com/cancel".to_owned(),
      timeout:     Duration::from_secs(10),
      retry:       RetryPolicy::default(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct List {
  #[serde(default)]
  data: Vec<Object>,
}

#[derive(Debug, Deserialize)]
struct Object {
  id: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
  url: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
  client: Client,
  config: StripeConfig,
}

impl StripeClient {
  pub fn new(config: StripeConfig) -> Result<Self> {
    let client = build_client(config.timeout)?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
    let key = self
      .config
      .secret_key
      .as_deref()
      .filter(|k| !k.is_empty())
      .ok_or(Error::Unconfigured("stripe"))?;
    Ok(req.bearer_auth(key))
  }

  /// `GET /v1/customers/search?query=phone:'<phone>'`: the first match.
  pub async fn find_customer(&self, phone: &str) -> Result<Option<String>> {
    const OP: &str = "customer search";
    let query = format!("phone:'{}'", phone.replace('\'', "\\'"));
    let req   = self.authed(self.client.get(self.url("/customers/search")))?
      .query(&[("query", query)]);

    let resp = self.config.retry.send(OP, req).await?;
    let resp = expect_status(OP, resp, StatusCode::OK).await?;
    let found: List = json(OP, resp).await?;
    Ok(found.data.into_iter().next().map(|c| c.id))
  }

  /// `GET /v1/subscriptions?customer=<id>&status=active&limit=1`
  pub async fn has_active_subscription(&self, customer_id: &str) -> Result<bool> {
    const OP: &str = "subscription list";
    let req = self.authed(self.client.get(self.url("/subscriptions")))?.query(&[
      ("customer", customer_id),
      ("status", "active"),
      ("limit", "1"),
    ]);

    let resp = self.config.retry.send(OP, req).await?;
    let resp = expect_status(OP, resp, StatusCode::OK).await?;
    let subs: List = json(OP, resp).await?;
    Ok(!subs.data.is_empty())
  }

  /// `POST /v1/checkout/sessions` for one unit of the configured price.
  /// Returns the hosted checkout URL.
  pub async fn create_checkout_session(&self) -> Result<String> {
    const OP: &str = "checkout session create";
    let price = self
      .config
      .price_id
      .as_deref()
      .filter(|p| !p.is_empty())
      .ok_or(Error::Unconfigured("stripe price"))?;

    let form = [
      ("mode", "subscription"),
      ("payment_method_types[0]", "card"),
      ("line_items[0][price]", price),
      ("line_items[0][quantity]", "1"),
      ("success_url", self.config.success_url.as_str()),
      ("cancel_url", self.config.cancel_url.as_str()),
    ];
    let req = self.authed(self.client.post(self.url("/checkout/sessions")))?.form(&form);

    let resp = self.config.retry.send(OP, req).await?;
    let resp = expect_status(OP, resp, StatusCode::OK).await?;
    let session: CheckoutSession = json(OP, resp).await?;
    session.url.ok_or(Error::Protocol { operation: OP, message: "session has no url".into() })
  }
}
