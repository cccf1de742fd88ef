//! Error kinds. §7 of the design: these map 1:1 onto the semantic error
//! kinds the endpoint and codec can raise; they are not meant to mirror any
//! particular exception hierarchy.

use crate::msg::Message;

/// Something about a decoded (or about-to-be-encoded) frame violates the
/// CoAP frame or option rules.
///
/// Recoverable by dropping the datagram; a server may reply with an empty
/// RST for a CON that fails to decode (see [`crate::endpoint::server`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum FormatError {
  #[error("datagram is {0} bytes, need at least 4")]
  TooShort(usize),

  #[error("unsupported CoAP version {0}, only version 1 is recognized")]
  BadVersion(u8),

  #[error("token length {0} is invalid (valid range is 0..=8)")]
  BadTokenLength(u8),

  #[error("option value length {length} exceeds remaining buffer ({remaining} bytes left)")]
  OptionValueOverrun { length: usize, remaining: usize },

  #[error("payload marker (0xFF) present with no payload bytes following")]
  EmptyPayloadAfterMarker,

  #[error("non-repeatable option {0} appeared more than once")]
  RepeatedOption(u16),

  #[error("option number {prev} decoded before {next}; options must be non-decreasing")]
  OptionsOutOfOrder { prev: u16, next: u16 },

  #[error("option {0} is critical and not recognized")]
  UnrecognizedCriticalOption(u16),

  #[error("code {class}.{detail:02} is not a recognized request/response/empty code")]
  BadCode { class: u8, detail: u8 },

  #[error("option {number} value is {len} bytes, expected {min}..={max}")]
  OptionLengthOutOfRange { number: u16, len: usize, min: usize, max: usize },

  #[error("option {0} value is not valid UTF-8")]
  OptionNotUtf8(u16),

  #[error("reserved option nibble value (15) used outside the payload marker")]
  ReservedOptionNibble,
}

/// Top-level error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A decoded (or about-to-be-encoded) frame violates the wire format.
  #[error(transparent)]
  Format(#[from] FormatError),

  /// A caller-supplied value failed a precondition: a null/missing field, a
  /// message of the wrong type for the slot it was passed to (e.g. a CON
  /// response), or an invalid URL.
  #[error("invalid argument: {0}")]
  Argument(String),

  /// The size cap was exceeded, or an option value is out of the range the
  /// recognized-options table allows.
  #[error("unsupported: {0}")]
  Unsupported(String),

  /// A CONfirmable message exhausted its retransmission budget without an
  /// ACK or RST.
  #[error("message {id:#06x} undelivered after {attempts} attempts")]
  Undelivered {
    /// The message ID that was never acknowledged.
    id: u16,
    /// How many times the message was (re)transmitted.
    attempts: u8,
    /// The message that was never delivered, for diagnosis / retry by the
    /// caller.
    message: Box<Message>,
  },

  /// The underlying UDP socket failed.
  #[error("socket I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub(crate) fn argument(msg: impl Into<String>) -> Self {
    Self::Argument(msg.into())
  }

  pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
    Self::Unsupported(msg.into())
  }
}
