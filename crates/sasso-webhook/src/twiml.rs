//! TwiML generation.
//!
//! Uses `quick-xml`'s writer API. Verbs are appended in order with a
//! by-value builder and the document is closed by [`Twiml::finish`] or by
//! returning the builder from a handler.

use std::io::Cursor;

use axum::{
  http::header,
  response::{IntoResponse, Response},
};
use quick_xml::{
  Writer,
  escape::partial_escape,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Every callback Twilio makes back into this server is a `POST`.
const METHOD: (&str, &str) = ("method", "POST");

/// Attributes of the `<Dial>` verb that bridges the caller to technicians.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialSettings {
  /// Seconds to ring before giving up.
  pub timeout_secs:    u32,
  /// Maximum length of the bridged call.
  pub time_limit_secs: u32,
}

impl Default for DialSettings {
  fn default() -> Self { Self { timeout_secs: 30, time_limit_secs: 600 } }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct Twiml {
  writer: Writer<Cursor<Vec<u8>>>,
  /// Whether `<Response>` has been opened; an empty document collapses to
  /// `<Response/>`.
  open:   bool,
}

impl Default for Twiml {
  fn default() -> Self { Self::new() }
}

impl Twiml {
  pub fn new() -> Self {
    let mut twiml = Self { writer: Writer::new(Cursor::new(Vec::new())), open: false };
    twiml.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));
    twiml
  }

  fn emit(&mut self, event: Event<'_>) {
    // Writes go to an in-memory buffer and cannot fail.
    self.writer.write_event(event).expect("write to in-memory buffer");
  }

  fn verb(&mut self) -> &mut Self {
    if !self.open {
      self.emit(Event::Start(BytesStart::new("Response")));
      self.open = true;
    }
    self
  }

  fn text_elem(&mut self, el: BytesStart<'_>, text: &str) {
    let name = String::from_utf8_lossy(el.name().as_ref()).into_owned();
    self.emit(Event::Start(el));
    self.emit(Event::Text(BytesText::from_escaped(partial_escape(text))));
    self.emit(Event::End(BytesEnd::new(name)));
  }

  /// `<Say>text</Say>`
  pub fn say(mut self, text: &str) -> Self {
    self.verb().text_elem(BytesStart::new("Say"), text);
    self
  }

  /// `<Redirect method="POST">url</Redirect>`
  pub fn redirect(mut self, url: &str) -> Self {
    let el = BytesStart::new("Redirect").with_attributes([METHOD]);
    self.verb().text_elem(el, url);
    self
  }

  /// `<Hangup/>`
  pub fn hangup(mut self) -> Self {
    self.verb().emit(Event::Empty(BytesStart::new("Hangup")));
    self
  }

  /// `<Record maxLength action method="POST"/>`
  pub fn record(mut self, max_length_secs: u32, action: &str) -> Self {
    let max_length = max_length_secs.to_string();
    let el = BytesStart::new("Record").with_attributes([
      ("maxLength", max_length.as_str()),
      ("action", action),
      METHOD,
    ]);
    self.verb().emit(Event::Empty(el));
    self
  }

  /// `<Gather numDigits action method="POST"><Say>prompt</Say></Gather>`
  pub fn gather(mut self, num_digits: u32, action: &str, prompt: &str) -> Self {
    let digits = num_digits.to_string();
    let el = BytesStart::new("Gather").with_attributes([
      ("numDigits", digits.as_str()),
      ("action", action),
      METHOD,
    ]);
    self.verb().emit(Event::Start(el));
    self.text_elem(BytesStart::new("Say"), prompt);
    self.emit(Event::End(BytesEnd::new("Gather")));
    self
  }

  /// A `<Dial>` ringing every number at once. The dial result posts to
  /// `/call-status`; each answered leg reports its completion to
  /// `/call-completed`.
  pub fn dial(mut self, settings: &DialSettings, numbers: &[String]) -> Self {
    let timeout    = settings.timeout_secs.to_string();
    let time_limit = settings.time_limit_secs.to_string();
    let el = BytesStart::new("Dial").with_attributes([
      ("timeout", timeout.as_str()),
      ("timeLimit", time_limit.as_str()),
      ("action", "/call-status"),
      METHOD,
    ]);
    self.verb().emit(Event::Start(el));

    for number in numbers {
      let el = BytesStart::new("Number").with_attributes([
        ("statusCallbackEvent", "completed"),
        ("statusCallback", "/call-completed"),
        ("statusCallbackMethod", "POST"),
      ]);
      self.text_elem(el, number);
    }

    self.emit(Event::End(BytesEnd::new("Dial")));
    self
  }

  pub fn finish(mut self) -> String {
    if self.open {
      self.emit(Event::End(BytesEnd::new("Response")));
    } else {
      self.emit(Event::Empty(BytesStart::new("Response")));
    }
    // quick-xml only ever writes valid UTF-8 from `&str` input.
    String::from_utf8_lossy(&self.writer.into_inner().into_inner()).into_owned()
  }
}

impl IntoResponse for Twiml {
  fn into_response(self) -> Response {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], self.finish()).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

  #[test]
  fn empty_document_is_self_closing() {
    assert_eq!(Twiml::new().finish(), format!("{DECL}<Response/>"));
  }

  #[test]
  fn say_escapes_text() {
    let xml = Twiml::new().say("Tom & Jerry <3").hangup().finish();
    assert_eq!(
      xml,
      format!("{DECL}<Response><Say>Tom &amp; Jerry &lt;3</Say><Hangup/></Response>")
    );
  }

  #[test]
  fn gather_wraps_prompt() {
    let xml = Twiml::new().gather(1, "/menu", "Press 1.").redirect("/menu/prompt").finish();
    assert!(xml.contains(
      r#"<Gather numDigits="1" action="/menu" method="POST"><Say>Press 1.</Say></Gather>"#
    ));
    assert!(xml.contains(r#"<Redirect method="POST">/menu/prompt</Redirect>"#));
  }

  #[test]
  fn dial_lists_each_number_with_status_callback() {
    let numbers = vec!["+15550001111".to_owned(), "+15550002222".to_owned()];
    let xml = Twiml::new().dial(&DialSettings::default(), &numbers).finish();

    assert!(xml.contains(
      r#"<Dial timeout="30" timeLimit="600" action="/call-status" method="POST">"#
    ));
    assert_eq!(xml.matches(r#"statusCallback="/call-completed""#).count(), 2);
    assert!(xml.contains(
      r#"<Number statusCallbackEvent="completed" statusCallback="/call-completed" statusCallbackMethod="POST">+15550002222</Number>"#
    ));
  }

  #[test]
  fn record_sets_length_and_action() {
    let xml = Twiml::new().record(60, "/goodbye").finish();
    assert!(xml.contains(r#"<Record maxLength="60" action="/goodbye" method="POST"/>"#));
  }
}
