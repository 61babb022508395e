pub mod menu;
pub mod status;

use std::sync::Arc;

use chrono::Utc;
use sasso_core::{
  crm::CrmClient,
  event::{CallEvent, EventKind, WebhookFields},
  reconcile::Reconciliation,
  store::IdempotencyStore,
};
use tracing::{debug, warn};

use crate::{AppState, error::Result, ivr::MenuServices};

fn call_event(kind: EventKind, fields: &WebhookFields) -> Option<CallEvent> {
  let observed_at_ms = Utc::now().timestamp_millis();
  let event = match CallEvent::from_webhook(kind, fields, observed_at_ms) {
    Ok(event) => event,
    Err(e) => {
      warn!(%kind, call_sid = ?fields.call_sid, error = %e, "skipping webhook");
      return None;
    }
  };

  debug!(
    %kind,
    subject = %event.subject,
    call_id = %event.call_id,
    parent_id = ?event.parent_id,
    status = ?event.provider_status,
    duration = event.duration_seconds,
    "received call event"
  );
  Some(event)
}

/// Run one webhook delivery through the reconciler.
///
/// The work runs on its own task so a webhook connection dropped by the
/// provider cannot cancel it between the CRM submission and the record.
/// Deliveries that cannot be keyed are skipped and yield `None`.
pub(crate) async fn reconcile<S, C, M>(
  state: &AppState<S, C, M>,
  kind: EventKind,
  fields: &WebhookFields,
) -> Result<Option<Reconciliation>>
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  let Some(event) = call_event(kind, fields) else {
    return Ok(None);
  };

  let reconciler = Arc::clone(&state.reconciler);
  let outcome = tokio::spawn(async move { reconciler.reconcile(&event).await }).await?;
  Ok(Some(outcome))
}

/// Reconcile a delivery on a task nobody waits for.
///
/// Only for informational events: nothing is recorded, so the response need
/// not wait on the CRM.
pub(crate) fn reconcile_detached<S, C, M>(
  state: &AppState<S, C, M>,
  kind: EventKind,
  fields: &WebhookFields,
) where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  let Some(event) = call_event(kind, fields) else {
    return;
  };

  let reconciler = Arc::clone(&state.reconciler);
  tokio::spawn(async move {
    let outcome = reconciler.reconcile(&event).await;
    debug!(call_id = %event.call_id, ?outcome, "detached reconciliation finished");
  });
}
