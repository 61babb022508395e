//! Subscription checks and payment links for the phone menu.
//!
//! Both operations answer with a plain `bool`: a caller on the line is better
//! served by a fallback prompt than by an error, so failures are logged here
//! and reported as "no".

use tracing::{debug, error, info};

use crate::{Result, stripe::StripeClient, twilio::TwilioClient};

/// The message texted alongside a checkout link.
pub fn payment_link_message(url: &str) -> String {
  format!("To get immediate support, subscribe here: {url}")
}

#[derive(Clone)]
pub struct Billing {
  stripe: StripeClient,
  twilio: TwilioClient,
}

impl Billing {
  pub fn new(stripe: StripeClient, twilio: TwilioClient) -> Self { Self { stripe, twilio } }

  /// Whether the Stripe customer with this phone number has an active
  /// subscription.
  pub async fn has_active_subscription(&self, phone: &str) -> bool {
    match self.lookup_subscription(phone).await {
      Ok(active) => {
        debug!(phone, active, "subscription lookup");
        active
      }
      Err(e) => {
        error!(phone, error = %e, "subscription lookup failed");
        false
      }
    }
  }

  async fn lookup_subscription(&self, phone: &str) -> Result<bool> {
    match self.stripe.find_customer(phone).await? {
      Some(customer) => self.stripe.has_active_subscription(&customer).await,
      None => Ok(false),
    }
  }

  /// Create a checkout session and text its link to `phone`.
  pub async fn send_payment_link(&self, phone: &str) -> bool {
    match self.deliver_payment_link(phone).await {
      Ok(()) => {
        info!(phone, "sent payment link");
        true
      }
      Err(e) => {
        error!(phone, error = %e, "sending payment link failed");
        false
      }
    }
  }

  async fn deliver_payment_link(&self, phone: &str) -> Result<()> {
    let url = self.stripe.create_checkout_session().await?;
    self.twilio.send_sms(phone, &payment_link_message(&url)).await?;
    Ok(())
  }
}
