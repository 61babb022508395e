//! Handlers for the caller-facing voice flow: greeting, menu and voicemail.

use axum::{Form, extract::State};
use sasso_core::{
  crm::CrmClient,
  event::{EventKind, WebhookFields},
  store::IdempotencyStore,
};
use tracing::info;

use crate::{
  AppState,
  error::Result,
  handlers::reconcile_detached,
  ivr::{self, MenuChoice, MenuServices},
  twiml::Twiml,
};

pub async fn root() -> &'static str { "Use /voice for Twilio." }

/// `POST /voice`: a new inbound call.
pub async fn voice<S, C, M>(
  State(state): State<AppState<S, C, M>>,
  Form(fields): Form<WebhookFields>,
) -> Result<Twiml>
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  info!(from = ?fields.from, call_sid = ?fields.call_sid, "incoming call");
  reconcile_detached(&state, EventKind::Initiated, &fields);

  if !state.is_open() {
    return Ok(ivr::voicemail(ivr::CLOSED));
  }
  if state.config.menu_enabled {
    return Ok(ivr::menu_prompt());
  }
  let numbers = ivr::technicians(&state.config.technician_numbers)?;
  Ok(Twiml::new().dial(&state.config.dial(), &numbers))
}

/// `POST /menu/prompt`: replay the menu without logging anything.
pub async fn menu_prompt() -> Twiml { ivr::menu_prompt() }

/// `POST /menu`: the caller pressed a key.
pub async fn menu<S, C, M>(
  State(state): State<AppState<S, C, M>>,
  Form(fields): Form<WebhookFields>,
) -> Result<Twiml>
where
  S: IdempotencyStore + 'static,
  C: CrmClient + 'static,
  M: MenuServices + 'static,
{
  let choice = MenuChoice::from_digits(fields.digits.as_deref());
  let phone  = fields.subject();
  info!(from = ?phone, ?choice, "menu selection");

  match choice {
    MenuChoice::Technician => {
      let subscribed = match phone {
        Some(phone) => state.menu.has_active_subscription(phone).await,
        None => false,
      };
      if !subscribed {
        return Ok(ivr::reprompt(ivr::NO_SUBSCRIPTION));
      }
      let numbers = ivr::technicians(&state.config.technician_numbers)?;
      Ok(Twiml::new().say(ivr::VERIFYING).dial(&state.config.dial(), &numbers))
    }
    MenuChoice::Voicemail => Ok(ivr::voicemail(ivr::LEAVE_MESSAGE)),
    MenuChoice::PaymentLink => {
      let sent = match phone {
        Some(phone) => state.menu.send_payment_link(phone).await,
        None => false,
      };
      let message = if sent { ivr::LINK_SENT } else { ivr::LINK_FAILED };
      Ok(Twiml::new().say(message).hangup())
    }
    MenuChoice::Invalid => Ok(ivr::reprompt(ivr::INVALID_OPTION)),
  }
}

/// `POST /goodbye`: after a voicemail is recorded.
pub async fn goodbye() -> Twiml { Twiml::new().say(ivr::GOODBYE).hangup() }
