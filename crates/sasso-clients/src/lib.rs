//! Outbound HTTP clients for the Sasso call connector.
//!
//! [`hubspot::HubSpotClient`] implements [`sasso_core::crm::CrmClient`];
//! [`stripe::StripeClient`] and [`twilio::TwilioClient`] back the phone
//! menu's subscription check and payment-link SMS through [`billing::Billing`].
//! All three share the timeout and retry behaviour in [`http`].

pub mod billing;
pub mod error;
pub mod http;
pub mod hubspot;
pub mod stripe;
pub mod twilio;

pub use error::{Error, Result};
