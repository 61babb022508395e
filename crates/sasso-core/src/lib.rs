//! Core types and trait definitions for the Sasso call connector.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the reconciliation engine that turns Twilio lifecycle webhooks into exactly
//! one CRM call log per call; storage backends and network clients plug in
//! through the [`store::IdempotencyStore`] and [`crm::CrmClient`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod crm;
pub mod disposition;
pub mod error;
pub mod event;
pub mod hours;
pub mod ledger;
pub mod memory;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
