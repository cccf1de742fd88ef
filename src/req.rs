//! Request envelope: a [`Message`] constrained to `Type ∈ {Con, Non}` and a
//! request [`Code`], plus the URL binding described in §4.2.

use crate::error::Error;
use crate::msg::{Code, Message, Token, Type};
use crate::url::{self, Url};

/// RFC 7252 §12.1.1 method codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub const fn code(self) -> Code {
    match self {
      | Method::Get => Code::new(0, 1),
      | Method::Post => Code::new(0, 2),
      | Method::Put => Code::new(0, 3),
      | Method::Delete => Code::new(0, 4),
    }
  }

  fn from_code(code: Code) -> Option<Self> {
    match (code.class, code.detail) {
      | (0, 1) => Some(Method::Get),
      | (0, 2) => Some(Method::Post),
      | (0, 3) => Some(Method::Put),
      | (0, 4) => Some(Method::Delete),
      | _ => None,
    }
  }
}

/// A CoAP request: always `Con` or `Non`, never `Ack`/`Rst` (§3, §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct Request(Message);

impl Request {
  /// Build a new request addressed at `url`, confirmable unless
  /// `non_confirmable` is set.
  pub fn new(method: Method, url: &str, id: u16, token: Token, non_confirmable: bool) -> Result<Self, Error> {
    let parsed = url::parse(url)?;
    let ty = if non_confirmable { Type::Non } else { Type::Con };
    let mut msg = Message::new(ty, method.code(), id, token);
    for (number, value) in url::to_options(&parsed) {
      msg.push_option(number, value)?;
    }
    Ok(Self(msg))
  }

  /// Wrap an already-decoded [`Message`], validating it's shaped like a
  /// request.
  pub fn from_message(msg: Message) -> Result<Self, Error> {
    if !matches!(msg.ty, Type::Con | Type::Non) {
      return Err(Error::argument(format!("request type must be Con or Non, got {:?}", msg.ty)));
    }
    if !msg.code.is_request() {
      return Err(Error::argument(format!("code {} is not a request code", msg.code)));
    }
    Ok(Self(msg))
  }

  pub fn method(&self) -> Option<Method> {
    Method::from_code(self.0.code)
  }

  pub fn is_confirmable(&self) -> bool {
    self.0.ty == Type::Con
  }

  pub fn id(&self) -> u16 {
    self.0.id
  }

  pub fn token(&self) -> &Token {
    &self.0.token
  }

  pub fn message(&self) -> &Message {
    &self.0
  }

  pub fn into_message(self) -> Message {
    self.0
  }

  pub fn set_payload(&mut self, payload: Vec<u8>) {
    self.0.payload = Some(payload);
  }

  pub fn payload(&self) -> &[u8] {
    self.0.payload_bytes()
  }

  /// Reconstruct the URL this request targets, falling back to
  /// `default_host`/`default_port` (typically the peer's socket address)
  /// when the Uri-Host/Uri-Port options are absent, per §4.2.
  pub fn url(&self, default_host: &str, default_port: u16) -> Url {
    url::from_options(self.0.options(), false, default_host, default_port)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn builds_request_with_url_options() {
    let req = Request::new(Method::Get, "coap://192.0.2.1/time", 1, Token::empty(), false).unwrap();
    assert_eq!(req.message().option_value(crate::msg::option::URI_HOST), Some(&b"192.0.2.1"[..]));
    assert_eq!(req.message().option_value(crate::msg::option::URI_PATH), Some(&b"time"[..]));
    assert!(req.is_confirmable());
  }

  #[test]
  fn non_confirmable_flag_sets_type() {
    let req = Request::new(Method::Get, "coap://h/a", 1, Token::empty(), true).unwrap();
    assert!(!req.is_confirmable());
  }

  #[test]
  fn from_message_rejects_ack_type() {
    let mut msg = Message::new(Type::Ack, Method::Get.code(), 1, Token::empty());
    msg.payload = None;
    assert!(Request::from_message(msg).is_err());
  }

  #[test]
  fn from_message_rejects_response_code() {
    let msg = Message::new(Type::Con, Code::new(2, 5), 1, Token::empty());
    assert!(Request::from_message(msg).is_err());
  }

  #[test]
  fn url_roundtrips_through_options() {
    let req = Request::new(Method::Get, "coap://192.0.2.1:9999/a/b?q=1", 1, Token::empty(), false).unwrap();
    let url = req.url("unused", 0);
    assert_eq!(url.host, "192.0.2.1");
    assert_eq!(url.port, 9999);
    assert_eq!(url.path, vec!["a", "b"]);
    assert_eq!(url.query, vec!["q=1"]);
  }

  #[test]
  fn url_falls_back_to_peer_address_when_options_absent() {
    let msg = Message::new(Type::Con, Method::Get.code(), 1, Token::empty());
    let req = Request::from_message(msg).unwrap();
    let url = req.url("198.51.100.1", 5683);
    assert_eq!(url.host, "198.51.100.1");
    assert_eq!(url.port, 5683);
  }
}
