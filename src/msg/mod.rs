//! The shared CoAP message frame: version, type, code, message ID, token,
//! options, and payload. §3/§4.1 of the design.
//!
//! [`Request`](crate::req::Request) and [`Response`](crate::resp::Response)
//! are typed variants built on top of this shared shape; see their modules
//! for the constraints each enforces (e.g. a `Response` can never be `Con`).

pub mod codec;
pub mod option;

pub use option::{ContentFormat, OptNumber};

use crate::error::{Error, FormatError};

/// CoAP protocol version. Always 1; the 2-bit field exists for forward
/// compatibility that RFC 7252 never exercises.
pub const VERSION: u8 = 1;

/// Message type, RFC 7252 §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
  /// Confirmable: retransmitted until ACKed or RSTed, or the retry budget
  /// is exhausted.
  Con,
  /// Non-confirmable: fire-and-forget.
  Non,
  /// Acknowledgement of a CON.
  Ack,
  /// Reset: "I got your message but can't/won't process it."
  Rst,
}

impl Type {
  pub(crate) fn bits(self) -> u8 {
    match self {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Rst => 3,
    }
  }

  pub(crate) fn from_bits(bits: u8) -> Self {
    match bits & 0b11 {
      | 0 => Type::Con,
      | 1 => Type::Non,
      | 2 => Type::Ack,
      | _ => Type::Rst,
    }
  }
}

/// An 8-bit CoAP code, split into a 3-bit class and 5-bit detail and
/// conventionally written `class.detail` (e.g. `2.05`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
  pub class: u8,
  pub detail: u8,
}

impl Code {
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// `0.00`: used for pings and bare ACK/RST.
  pub const EMPTY: Code = Code::new(0, 0);

  pub(crate) fn byte(self) -> u8 {
    (self.class << 5) | (self.detail & 0b0001_1111)
  }

  pub(crate) fn from_byte(byte: u8) -> Self {
    Self { class: byte >> 5, detail: byte & 0b0001_1111 }
  }

  /// One of the four recognized request codes (§3): `0.01 GET`, `0.02
  /// POST`, `0.03 PUT`, `0.04 DELETE`. Other class-0 codes are not valid
  /// requests even though they share the request class.
  pub fn is_request(self) -> bool {
    self.class == 0 && matches!(self.detail, 1..=4)
  }

  /// Class 2, 4, or 5: a response code.
  pub fn is_response(self) -> bool {
    matches!(self.class, 2 | 4 | 5)
  }

  /// `0.00`: used for pings and bare ACK/RST.
  pub fn is_empty(self) -> bool {
    self.class == 0 && self.detail == 0
  }
}

impl std::fmt::Display for Code {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}

/// 16-bit message ID, used to match ACK/RST to the CON (or NON) they
/// respond to.
pub type MessageId = u16;

/// The 0-8 byte opaque token that matches a response (including separate
/// responses and Observe notifications) to its originating request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Token(pub Vec<u8>);

impl Token {
  pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, Error> {
    let bytes = bytes.into();
    if bytes.len() > 8 {
      return Err(Error::argument(format!("token length {} exceeds 8", bytes.len())));
    }
    Ok(Self(bytes))
  }

  pub fn empty() -> Self {
    Self(Vec::new())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// The shared message frame backing both [`crate::req::Request`] and
/// [`crate::resp::Response`].
///
/// Options are stored as an ordered `(number, value)` sequence rather than
/// the delta-encoded wire representation; [`codec`] computes deltas only at
/// the moment of encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
  pub ty: Type,
  pub code: Code,
  pub id: MessageId,
  pub token: Token,
  options: Vec<(OptNumber, Vec<u8>)>,
  pub payload: Option<Vec<u8>>,
}

impl Message {
  pub fn new(ty: Type, code: Code, id: MessageId, token: Token) -> Self {
    Self { ty, code, id, token, options: Vec::new(), payload: None }
  }

  /// All options currently on this message, in ascending number order.
  pub fn options(&self) -> &[(OptNumber, Vec<u8>)] {
    &self.options
  }

  /// All values for a given option number, in the order they were added.
  pub fn option_values(&self, number: OptNumber) -> impl Iterator<Item = &[u8]> {
    self.options.iter().filter(move |(n, _)| *n == number).map(|(_, v)| v.as_slice())
  }

  /// The first value for a given option number, if present.
  pub fn option_value(&self, number: OptNumber) -> Option<&[u8]> {
    self.option_values(number).next()
  }

  /// Append an option, enforcing the non-repeatable rule at the single
  /// insertion point every caller goes through, so there's no separate path
  /// that could bypass it.
  pub fn push_option(&mut self, number: OptNumber, value: Vec<u8>) -> Result<(), Error> {
    if option::is_non_repeatable(number) && self.options.iter().any(|(n, _)| *n == number) {
      return Err(Error::argument(format!("option {number} is non-repeatable and already set")));
    }
    self.options.push((number, value));
    self.options.sort_by_key(|(n, _)| *n);
    Ok(())
  }

  pub fn payload_bytes(&self) -> &[u8] {
    self.payload.as_deref().unwrap_or(&[])
  }
}

pub(crate) fn validate_token_len(len: usize) -> Result<(), FormatError> {
  if len > 8 {
    Err(FormatError::BadTokenLength(len as u8))
  } else {
    Ok(())
  }
}
