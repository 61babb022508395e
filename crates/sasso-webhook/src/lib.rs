//! Twilio webhook layer for Sasso.
//!
//! Exposes an axum [`Router`] serving the voice flow and the call-status
//! callbacks. Terminal callbacks are reconciled into CRM call logs through a
//! [`Reconciler`] backed by any [`IdempotencyStore`] and [`CrmClient`].

pub mod error;
pub mod handlers;
pub mod ivr;
pub mod settings;
pub mod twiml;

pub use error::Error;
pub use settings::{ServerConfig, StoreBackend};

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use chrono::{DateTime, Utc};
use sasso_core::{
  crm::CrmClient, hours::BusinessHours, reconcile::Reconciler, store::IdempotencyStore,
};
use tower_http::trace::TraceLayer;

use handlers::{menu, status};
use ivr::MenuServices;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, C, M> {
  pub reconciler: Arc<Reconciler<S, C>>,
  pub menu:       Arc<M>,
  pub hours:      BusinessHours,
  /// Source of "now" for the business-hours gate.
  pub clock:      fn() -> DateTime<Utc>,
  pub config:     Arc<ServerConfig>,
}

impl<S, C, M> Clone for AppState<S, C, M> {
  fn clone(&self) -> Self {
    Self {
      reconciler: Arc::clone(&self.reconciler),
      menu:       Arc::clone(&self.menu),
      hours:      self.hours,
      clock:      self.clock,
      config:     Arc::clone(&self.config),
    }
  }
}

impl<S, C, M> AppState<S, C, M> {
  pub fn new(
    reconciler: Reconciler<S, C>,
    menu: M,
    hours: BusinessHours,
    config: ServerConfig,
  ) -> Self {
    Self {
      reconciler: Arc::new(reconciler),
      menu: Arc::new(menu),
      hours,
      clock: Utc::now,
      config: Arc::new(config),
    }
  }

  pub fn is_open(&self) -> bool { self.hours.is_open_at((self.clock)()) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the webhook server.
pub fn router<S, C, M>(state: AppState<S, C, M>) -> Router
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  Router::new()
    .route("/",               get(menu::root).post(menu::root))
    .route("/voice",          post(menu::voice::<S, C, M>))
    .route("/menu",           post(menu::menu::<S, C, M>))
    .route("/menu/prompt",    post(menu::menu_prompt))
    .route("/goodbye",        post(menu::goodbye))
    .route("/call-status",    post(status::call_status::<S, C, M>))
    .route("/call-completed", post(status::call_completed::<S, C, M>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
