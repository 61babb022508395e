//! Router tests driven through `tower::ServiceExt::oneshot` against an
//! in-memory store and recording fakes.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use chrono::{DateTime, TimeZone as _, Utc};
use sasso_core::{
  crm::{CallLog, CrmClient, CrmError, LoggedCall},
  disposition::{Disposition, Outcome},
  hours::BusinessHours,
  ledger::RetentionPolicy,
  memory::MemoryStore,
  reconcile::Reconciler,
  store::IdempotencyStore,
};
use tower::ServiceExt as _;

use super::*;

const CALLER: &str = "%2B15551234567";
const TECHS: &str = "+15550001111,+15550002222";

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingCrm {
  logs:  Mutex<Vec<CallLog>>,
  stall: Option<Duration>,
}

impl RecordingCrm {
  fn logs(&self) -> Vec<CallLog> { self.logs.lock().unwrap().clone() }

  /// Wait for a detached submission to land.
  async fn wait_for_logs(&self, n: usize) -> Vec<CallLog> {
    tokio::time::timeout(Duration::from_secs(5), async {
      loop {
        let logs = self.logs();
        if logs.len() >= n {
          return logs;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .expect("crm submission")
  }
}

impl CrmClient for RecordingCrm {
  async fn log_call(&self, log: &CallLog) -> Result<LoggedCall, CrmError> {
    if let Some(stall) = self.stall {
      tokio::time::sleep(stall).await;
    }
    self.logs.lock().unwrap().push(log.clone());
    Ok(LoggedCall { contact_id: "1".into(), call_id: None })
  }
}

#[derive(Default)]
struct FakeMenu {
  subscribed: bool,
  links_sent: Mutex<Vec<String>>,
}

impl MenuServices for FakeMenu {
  async fn has_active_subscription(&self, _phone: &str) -> bool { self.subscribed }

  async fn send_payment_link(&self, phone: &str) -> bool {
    self.links_sent.lock().unwrap().push(phone.to_owned());
    true
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

/// 15:00 UTC, 11:00 in New York.
fn midday() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap() }

/// 05:00 UTC, 01:00 in New York.
fn night() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 3, 5, 0, 0).unwrap() }

struct Harness {
  state: AppState<MemoryStore, RecordingCrm, FakeMenu>,
  store: Arc<MemoryStore>,
  crm:   Arc<RecordingCrm>,
}

fn harness(config: ServerConfig, menu: FakeMenu) -> Harness {
  harness_with_crm(config, menu, RecordingCrm::default())
}

fn harness_with_crm(config: ServerConfig, menu: FakeMenu, crm: RecordingCrm) -> Harness {
  let store = Arc::new(MemoryStore::new(RetentionPolicy::default()));
  let crm   = Arc::new(crm);
  let state = AppState {
    reconciler: Arc::new(Reconciler::new(Arc::clone(&store), Arc::clone(&crm))),
    menu:       Arc::new(menu),
    hours:      BusinessHours::default(),
    clock:      midday,
    config:     Arc::new(config),
  };
  Harness { state, store, crm }
}

fn config(menu_enabled: bool, technician_numbers: &str) -> ServerConfig {
  ServerConfig {
    menu_enabled,
    technician_numbers: technician_numbers.to_owned(),
    ..ServerConfig::default()
  }
}

async fn post_form(state: &Harness, uri: &str, form: &str) -> Response {
  let req = Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
    .body(Body::from(form.to_owned()))
    .unwrap();
  router(state.state.clone()).oneshot(req).await.unwrap()
}

async fn body_text(resp: Response) -> String {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  String::from_utf8(bytes.to_vec()).unwrap()
}

// ── Root ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_points_at_voice() {
  let h = harness(ServerConfig::default(), FakeMenu::default());
  let req = Request::builder().uri("/").body(Body::empty()).unwrap();
  let resp = router(h.state.clone()).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(body_text(resp).await, "Use /voice for Twilio.");
}

// ── /voice ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn voice_logs_initiated_call_and_serves_menu() {
  let h = harness(config(true, TECHS), FakeMenu::default());
  let resp = post_form(&h, "/voice", &format!("From={CALLER}&CallSid=CA100")).await;

  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], twiml::CONTENT_TYPE);
  let xml = body_text(resp).await;
  assert!(xml.contains(r#"<Gather numDigits="1" action="/menu" method="POST">"#), "{xml}");

  let logs = h.crm.wait_for_logs(1).await;
  assert_eq!(logs.len(), 1);
  assert_eq!(logs[0].subject, "+15551234567");
  assert_eq!(logs[0].outcome, Outcome::InProgress);
  assert_eq!(logs[0].duration_seconds, 0);
  // Initiated events never occupy the ledger.
  assert!(h.store.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn voice_answers_before_a_slow_crm() {
  let crm = RecordingCrm { stall: Some(Duration::from_secs(60)), ..RecordingCrm::default() };
  let h   = harness_with_crm(config(true, TECHS), FakeMenu::default(), crm);

  let resp = tokio::time::timeout(
    Duration::from_secs(2),
    post_form(&h, "/voice", &format!("From={CALLER}&CallSid=CA100")),
  )
  .await
  .expect("/voice waited on the crm");

  assert_eq!(resp.status(), StatusCode::OK);
  assert!(body_text(resp).await.contains("<Gather"));
  assert!(h.crm.logs().is_empty());
}

#[tokio::test]
async fn voice_without_menu_dials_technicians() {
  let h = harness(config(false, TECHS), FakeMenu::default());
  let xml = body_text(post_form(&h, "/voice", &format!("From={CALLER}&CallSid=CA100")).await).await;

  assert!(xml.contains(r#"<Dial timeout="30" timeLimit="600" action="/call-status" method="POST">"#));
  assert!(xml.contains(">+15550001111</Number>"));
  assert!(xml.contains(">+15550002222</Number>"));
}

#[tokio::test]
async fn voice_with_bad_roster_is_an_error() {
  let h = harness(config(false, "+15550001111,not-a-number"), FakeMenu::default());
  let resp = post_form(&h, "/voice", &format!("From={CALLER}&CallSid=CA100")).await;

  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body_text(resp).await, "Invalid technician numbers");
}

#[tokio::test]
async fn voice_after_hours_takes_a_message() {
  let mut h = harness(config(true, TECHS), FakeMenu::default());
  h.state.clock = night;
  let xml = body_text(post_form(&h, "/voice", &format!("From={CALLER}&CallSid=CA100")).await).await;

  assert!(xml.contains("currently closed"), "{xml}");
  assert!(xml.contains(r#"<Record maxLength="60" action="/goodbye" method="POST"/>"#));
  assert!(!xml.contains("<Gather"));
}

#[tokio::test]
async fn voice_without_caller_skips_crm() {
  let h = harness(config(true, TECHS), FakeMenu::default());
  let resp = post_form(&h, "/voice", "CallSid=CA100").await;

  assert_eq!(resp.status(), StatusCode::OK);
  assert!(h.crm.logs().is_empty());
}

// ── /menu ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscriber_is_connected() {
  let menu = FakeMenu { subscribed: true, ..FakeMenu::default() };
  let h    = harness(config(true, TECHS), menu);
  let xml  = body_text(post_form(&h, "/menu", &format!("From={CALLER}&Digits=1")).await).await;

  assert!(xml.contains(ivr::VERIFYING));
  assert!(xml.contains("<Dial "));
}

#[tokio::test]
async fn non_subscriber_returns_to_menu() {
  let h   = harness(config(true, TECHS), FakeMenu::default());
  let xml = body_text(post_form(&h, "/menu", &format!("From={CALLER}&Digits=1")).await).await;

  assert!(xml.contains(ivr::NO_SUBSCRIPTION));
  assert!(xml.contains(r#"<Redirect method="POST">/menu/prompt</Redirect>"#));
  assert!(!xml.contains("<Dial"));
}

#[tokio::test]
async fn option_two_records_voicemail() {
  let h   = harness(config(true, TECHS), FakeMenu::default());
  let xml = body_text(post_form(&h, "/menu", &format!("From={CALLER}&Digits=2")).await).await;

  assert!(xml.contains(ivr::LEAVE_MESSAGE));
  assert!(xml.contains(r#"action="/goodbye""#));
}

#[tokio::test]
async fn option_three_texts_payment_link() {
  let h   = harness(config(true, TECHS), FakeMenu::default());
  let xml = body_text(post_form(&h, "/menu", &format!("From={CALLER}&Digits=3")).await).await;

  assert!(xml.contains(ivr::LINK_SENT));
  assert!(xml.contains("<Hangup/>"));
  assert_eq!(*h.state.menu.links_sent.lock().unwrap(), ["+15551234567"]);
}

#[tokio::test]
async fn unknown_digit_reprompts() {
  let h   = harness(config(true, TECHS), FakeMenu::default());
  let xml = body_text(post_form(&h, "/menu", &format!("From={CALLER}&Digits=7")).await).await;

  assert!(xml.contains(ivr::INVALID_OPTION));
  assert!(xml.contains("/menu/prompt"));
}

#[tokio::test]
async fn prompt_and_goodbye_are_static() {
  let h = harness(config(true, TECHS), FakeMenu::default());

  let prompt = body_text(post_form(&h, "/menu/prompt", "").await).await;
  assert!(prompt.contains("Press 1"));

  let goodbye = body_text(post_form(&h, "/goodbye", "").await).await;
  assert!(goodbye.contains(ivr::GOODBYE));
  assert!(goodbye.contains("<Hangup/>"));
  assert!(h.crm.logs().is_empty());
}

// ── Status callbacks ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missed_call_is_logged_once() {
  let h    = harness(config(true, TECHS), FakeMenu::default());
  let form = format!("From={CALLER}&CallSid=CA1&DialCallSid=CA2&DialCallStatus=no-answer");

  let resp = post_form(&h, "/call-status", &form).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert!(body_text(resp).await.ends_with("<Response/>"));

  // Twilio retries the same webhook.
  post_form(&h, "/call-status", &form).await;

  let logs = h.crm.logs();
  assert_eq!(logs.len(), 1);
  assert_eq!(logs[0].disposition, Disposition::NoAnswer);
  assert_eq!(logs[0].outcome, Outcome::Missed);
  assert!(h.store.has("+15551234567", "CA1").await.unwrap());
}

#[tokio::test]
async fn completion_of_dialed_leg_is_a_duplicate() {
  let h = harness(config(true, TECHS), FakeMenu::default());
  post_form(
    &h,
    "/call-status",
    &format!("From={CALLER}&CallSid=CA1&DialCallSid=CA2&DialCallStatus=completed"),
  )
  .await;

  let resp = post_form(
    &h,
    "/call-completed",
    &format!("From={CALLER}&CallSid=CA2&ParentCallSid=CA1&CallStatus=completed&CallDuration=95"),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(body_text(resp).await, "OK");

  assert_eq!(h.crm.logs().len(), 1);
  // Recorded through the dial action's `DialCallSid`, not by the callback.
  let ledger = h.store.snapshot().await.unwrap();
  let ids: Vec<_> = ledger.records("+15551234567").iter().map(|r| r.call_id.as_str()).collect();
  assert_eq!(ids, ["CA1", "CA2"]);
}

#[tokio::test]
async fn long_completed_call_connects() {
  let h = harness(config(true, TECHS), FakeMenu::default());
  post_form(
    &h,
    "/call-completed",
    &format!("From={CALLER}&CallSid=CA2&ParentCallSid=CA1&CallStatus=completed&CallDuration=95"),
  )
  .await;

  let logs = h.crm.logs();
  assert_eq!(logs.len(), 1);
  assert_eq!(logs[0].disposition, Disposition::Connected);
  assert_eq!(logs[0].outcome, Outcome::Completed);
  assert_eq!(logs[0].duration_seconds, 95);
}

#[tokio::test]
async fn completion_without_call_sid_is_ignored() {
  let h    = harness(config(true, TECHS), FakeMenu::default());
  let resp = post_form(&h, "/call-completed", &format!("From={CALLER}&CallStatus=completed")).await;

  assert_eq!(resp.status(), StatusCode::OK);
  assert!(h.crm.logs().is_empty());
  assert!(h.store.snapshot().await.unwrap().is_empty());
}
