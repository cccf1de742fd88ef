//! Response envelope: a [`Message`] constrained to `Type ∈ {Ack, Rst, Non}`
//! — a response is never `Con` (§3) — plus the response-code constants from
//! RFC 7252 §5.9 and the Location-Path/Location-Query binding from §4.2.

use crate::error::Error;
use crate::msg::{Code, Message, Token, Type};
use crate::req::Request;
use crate::url::{self, Url};

pub const CREATED: Code = Code::new(2, 1);
pub const DELETED: Code = Code::new(2, 2);
pub const VALID: Code = Code::new(2, 3);
pub const CHANGED: Code = Code::new(2, 4);
pub const CONTENT: Code = Code::new(2, 5);
pub const BAD_REQUEST: Code = Code::new(4, 0);
pub const UNAUTHORIZED: Code = Code::new(4, 1);
pub const BAD_OPTION: Code = Code::new(4, 2);
pub const FORBIDDEN: Code = Code::new(4, 3);
pub const NOT_FOUND: Code = Code::new(4, 4);
pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
pub const NOT_ACCEPTABLE: Code = Code::new(4, 6);
pub const PRECONDITION_FAILED: Code = Code::new(4, 12);
pub const REQUEST_ENTITY_TOO_LARGE: Code = Code::new(4, 13);
pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);
pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
pub const NOT_IMPLEMENTED: Code = Code::new(5, 1);
pub const BAD_GATEWAY: Code = Code::new(5, 2);
pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);
pub const GATEWAY_TIMEOUT: Code = Code::new(5, 4);
pub const PROXYING_NOT_SUPPORTED: Code = Code::new(5, 5);

/// A CoAP response: `Ack` (piggybacked on the request's CON), `Non`
/// (unsolicited notification / NON request reply), or `Rst` (bare reset).
/// Never `Con` — a response doesn't get its own acknowledgement; a
/// *separate* response is sent as a fresh `Con`/`Non` request-shaped
/// message from the server's point of view, which is why
/// [`crate::separate`] builds those out of [`Message`] directly rather than
/// through this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Response(Message);

impl Response {
  /// Build a piggybacked ACK response carrying `code`, inheriting the
  /// originating request's message ID and token (§4.2).
  pub fn for_request(request: &Request, code: Code) -> Self {
    let mut msg = Message::new(Type::Ack, code, request.id(), request.token().clone());
    msg.payload = None;
    Self(msg)
  }

  /// Build an unsolicited `Non` notification (used for Observe, §4.5) with
  /// a fresh message ID and the observer's token.
  pub fn notification(code: Code, id: u16, token: Token) -> Self {
    Self(Message::new(Type::Non, code, id, token))
  }

  /// A bare reset: "I don't recognize this exchange," per §3.
  pub fn reset(id: u16) -> Self {
    Self(Message::new(Type::Rst, Code::EMPTY, id, Token::empty()))
  }

  /// A reset carrying a diagnostic code (§4.6: a server replies to a CON
  /// whose options fail to decode with `RST(4.00)` rather than the bare
  /// empty reset used for pings).
  pub fn reset_with_code(id: u16, code: Code) -> Self {
    Self(Message::new(Type::Rst, code, id, Token::empty()))
  }

  /// An empty ACK (§4.4/§4.6: acknowledges a CON whose response will arrive
  /// later as a separate message).
  pub fn empty_ack(id: u16, token: Token) -> Self {
    Self(Message::new(Type::Ack, Code::EMPTY, id, token))
  }

  pub fn from_message(msg: Message) -> Result<Self, Error> {
    if msg.ty == Type::Con {
      return Err(Error::argument("a response must not be Con"));
    }
    let code_ok = match msg.ty {
      | Type::Rst => true, // may carry a diagnostic code, see reset_with_code
      | Type::Ack | Type::Non => msg.code.is_response() || msg.code.is_empty(),
      | Type::Con => unreachable!(),
    };
    if !code_ok {
      return Err(Error::argument(format!("code {} is not valid for a {:?} response", msg.code, msg.ty)));
    }
    Ok(Self(msg))
  }

  pub fn code(&self) -> Code {
    self.0.code
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

  /// Attach a Location-Path/Location-Query binding (used on `2.01 Created`
  /// responses to point the client at the created resource), mirroring
  /// [`crate::url::to_options`] but into the Location- option numbers.
  pub fn set_location(&mut self, url: &Url) -> Result<(), Error> {
    for seg in &url.path {
      self.0.push_option(crate::msg::option::LOCATION_PATH, seg.as_bytes().to_vec())?;
    }
    for q in &url.query {
      self.0.push_option(crate::msg::option::LOCATION_QUERY, q.as_bytes().to_vec())?;
    }
    Ok(())
  }

  pub fn is_success(&self) -> bool {
    self.0.code.class == 2
  }

  pub fn is_error(&self) -> bool {
    matches!(self.0.code.class, 4 | 5)
  }
}
