//! The phone menu: prompts, digit handling and the technician roster.

use std::future::Future;

use sasso_clients::billing::Billing;

use crate::{
  error::{Error, Result},
  twiml::Twiml,
};

pub const WELCOME: &str = "Welcome to Sasso support. Press 1 if you have a support subscription. \
                           Press 2 to leave a message. Press 3 to get a payment link.";
pub const CLOSED: &str = "Thank you for calling Sasso support. Our office is currently closed. \
                          Please leave a message after the tone.";
pub const LEAVE_MESSAGE: &str = "Please leave a message after the tone.";
pub const VERIFYING: &str = "Verifying your subscription. One moment.";
pub const NO_SUBSCRIPTION: &str = "No active subscription found.";
pub const LINK_SENT: &str = "A payment link has been sent via text. Thank you.";
pub const LINK_FAILED: &str = "We could not send a payment link right now. Please try again later.";
pub const INVALID_OPTION: &str = "Invalid option.";
pub const GOODBYE: &str = "Thank you. We'll call you back soon.";

/// Longest voicemail, in seconds.
pub const VOICEMAIL_MAX_SECS: u32 = 60;

// ─── Services ────────────────────────────────────────────────────────────────

/// The external lookups behind menu options 1 and 3.
///
/// Both answer `false` on any failure; the caller hears a fallback prompt
/// rather than an error.
pub trait MenuServices: Send + Sync {
  fn has_active_subscription<'a>(
    &'a self,
    phone: &'a str,
  ) -> impl Future<Output = bool> + Send + 'a;

  fn send_payment_link<'a>(&'a self, phone: &'a str) -> impl Future<Output = bool> + Send + 'a;
}

impl MenuServices for Billing {
  async fn has_active_subscription(&self, phone: &str) -> bool {
    Billing::has_active_subscription(self, phone).await
  }

  async fn send_payment_link(&self, phone: &str) -> bool {
    Billing::send_payment_link(self, phone).await
  }
}

// ─── Menu ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
  Technician,
  Voicemail,
  PaymentLink,
  Invalid,
}

impl MenuChoice {
  pub fn from_digits(digits: Option<&str>) -> Self {
    match digits.map(str::trim) {
      Some("1") => Self::Technician,
      Some("2") => Self::Voicemail,
      Some("3") => Self::PaymentLink,
      _ => Self::Invalid,
    }
  }
}

/// The menu prompt, repeated when the caller enters nothing.
pub fn menu_prompt() -> Twiml {
  Twiml::new().gather(1, "/menu", WELCOME).redirect("/menu/prompt")
}

/// Prompt for and record a voicemail, then thank the caller.
pub fn voicemail(greeting: &str) -> Twiml {
  Twiml::new().say(greeting).record(VOICEMAIL_MAX_SECS, "/goodbye")
}

/// Back to the menu after `message`.
pub fn reprompt(message: &str) -> Twiml { Twiml::new().say(message).redirect("/menu/prompt") }

// ─── Technicians ─────────────────────────────────────────────────────────────

/// `+` followed by 10 to 15 digits.
pub fn is_e164(number: &str) -> bool {
  number
    .strip_prefix('+')
    .is_some_and(|digits| (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse the comma-separated technician roster. Blank entries are skipped;
/// an empty roster or any malformed entry rejects the whole list.
pub fn technicians(raw: &str) -> Result<Vec<String>> {
  let numbers: Vec<String> = raw
    .split(',')
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .map(str::to_owned)
    .collect();

  if numbers.is_empty() || !numbers.iter().all(|n| is_e164(n)) {
    return Err(Error::InvalidTechnicians);
  }
  Ok(numbers)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digits_select_options() {
    assert_eq!(MenuChoice::from_digits(Some("1")), MenuChoice::Technician);
    assert_eq!(MenuChoice::from_digits(Some("2")), MenuChoice::Voicemail);
    assert_eq!(MenuChoice::from_digits(Some("3")), MenuChoice::PaymentLink);
    assert_eq!(MenuChoice::from_digits(Some("12")), MenuChoice::Invalid);
    assert_eq!(MenuChoice::from_digits(None), MenuChoice::Invalid);
  }

  #[test]
  fn roster_is_trimmed_and_validated() {
    assert_eq!(
      technicians(" +15550001111, ,+447700900123 ").unwrap(),
      ["+15550001111", "+447700900123"]
    );
    assert!(technicians("").is_err());
    assert!(technicians(" , ").is_err());
    assert!(technicians("+15550001111,5550002222").is_err());
    assert!(technicians("+1555").is_err());
    assert!(technicians("+1234567890123456").is_err());
    assert!(technicians("+1555000111a").is_err());
  }

  #[test]
  fn menu_prompt_repeats_itself() {
    let xml = menu_prompt().finish();
    assert!(xml.contains(r#"action="/menu""#));
    assert!(xml.contains("Press 3 to get a payment link."));
    assert!(xml.ends_with(r#"<Redirect method="POST">/menu/prompt</Redirect></Response>"#));
  }
}
