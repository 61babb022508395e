//! Status callbacks: the dial result and each dialed leg's completion.

use axum::{Form, extract::State};
use sasso_core::{
  crm::CrmClient,
  event::{EventKind, WebhookFields},
  store::IdempotencyStore,
};

use crate::{AppState, error::Result, handlers::reconcile, ivr::MenuServices, twiml::Twiml};

/// `POST /call-status`: the `<Dial>` action callback.
pub async fn call_status<S, C, M>(
  State(state): State<AppState<S, C, M>>,
  Form(fields): Form<WebhookFields>,
) -> Result<Twiml>
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  reconcile(&state, EventKind::DialOutcome, &fields).await?;
  Ok(Twiml::new())
}

/// `POST /call-completed`: a dialed technician leg hung up.
pub async fn call_completed<S, C, M>(
  State(state): State<AppState<S, C, M>>,
  Form(fields): Form<WebhookFields>,
) -> Result<&'static str>
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  reconcile(&state, EventKind::Completed, &fields).await?;
  Ok("OK")
}
