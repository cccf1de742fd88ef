//! The recognized-option table: each number's expected representation,
//! length bounds, and repeatability, per §4.1.
//!
//! Unknown *critical* (odd-numbered, RFC 7252 §5.4.6) options fail to
//! decode; unknown elective options are preserved verbatim as opaque bytes.

use crate::error::FormatError;

/// An option number. A plain `u16` alias rather than a newtype: unlike
/// [`crate::msg::Token`] or [`crate::msg::MessageId`] it never needs to
/// carry extra invariants of its own, only to be looked up in
/// [`recognized`].
pub type OptNumber = u16;

pub const IF_MATCH: OptNumber = 1;
pub const URI_HOST: OptNumber = 3;
pub const OBSERVE: OptNumber = 6;
pub const ETAG: OptNumber = 4;
pub const IF_NONE_MATCH: OptNumber = 5;
pub const URI_PORT: OptNumber = 7;
pub const LOCATION_PATH: OptNumber = 8;
pub const URI_PATH: OptNumber = 11;
pub const CONTENT_FORMAT: OptNumber = 12;
pub const MAX_AGE: OptNumber = 14;
pub const URI_QUERY: OptNumber = 15;
pub const ACCEPT: OptNumber = 17;
pub const LOCATION_QUERY: OptNumber = 20;
pub const PROXY_URI: OptNumber = 35;
pub const PROXY_SCHEME: OptNumber = 39;
pub const SIZE1: OptNumber = 60;

/// How an option's value bytes should be interpreted, for validation
/// purposes. The bytes on the wire are always opaque; this just governs
/// what [`codec`](crate::msg::codec) checks before accepting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
  Empty,
  Opaque,
  Uint,
  String,
}

/// A recognized option's metadata.
#[derive(Debug, Clone, Copy)]
pub struct OptSpec {
  pub number: OptNumber,
  pub name: &'static str,
  pub repr: Repr,
  pub min_len: usize,
  pub max_len: usize,
  pub repeatable: bool,
}

const TABLE: &[OptSpec] = &[OptSpec { number: IF_MATCH, name: "If-Match", repr: Repr::Opaque, min_len: 0, max_len: 8, repeatable: true },
                            OptSpec { number: URI_HOST, name: "Uri-Host", repr: Repr::String, min_len: 1, max_len: 255, repeatable: false },
                            OptSpec { number: ETAG, name: "ETag", repr: Repr::Opaque, min_len: 1, max_len: 8, repeatable: true },
                            OptSpec { number: IF_NONE_MATCH, name: "If-None-Match", repr: Repr::Empty, min_len: 0, max_len: 0, repeatable: false },
                            OptSpec { number: OBSERVE, name: "Observe", repr: Repr::Uint, min_len: 0, max_len: 3, repeatable: false },
                            OptSpec { number: URI_PORT, name: "Uri-Port", repr: Repr::Uint, min_len: 0, max_len: 2, repeatable: false },
                            OptSpec { number: LOCATION_PATH, name: "Location-Path", repr: Repr::String, min_len: 0, max_len: 255, repeatable: true },
                            OptSpec { number: URI_PATH, name: "Uri-Path", repr: Repr::String, min_len: 0, max_len: 255, repeatable: true },
                            OptSpec { number: CONTENT_FORMAT, name: "Content-Format", repr: Repr::Uint, min_len: 0, max_len: 2, repeatable: false },
                            OptSpec { number: MAX_AGE, name: "Max-Age", repr: Repr::Uint, min_len: 0, max_len: 4, repeatable: false },
                            OptSpec { number: URI_QUERY, name: "Uri-Query", repr: Repr::String, min_len: 0, max_len: 255, repeatable: true },
                            OptSpec { number: ACCEPT, name: "Accept", repr: Repr::Uint, min_len: 0, max_len: 2, repeatable: false },
                            OptSpec { number: LOCATION_QUERY, name: "Location-Query", repr: Repr::String, min_len: 0, max_len: 255, repeatable: true },
                            OptSpec { number: PROXY_URI, name: "Proxy-Uri", repr: Repr::String, min_len: 1, max_len: 1034, repeatable: false },
                            OptSpec { number: PROXY_SCHEME, name: "Proxy-Scheme", repr: Repr::String, min_len: 1, max_len: 255, repeatable: false },
                            OptSpec { number: SIZE1, name: "Size1", repr: Repr::Uint, min_len: 0, max_len: 4, repeatable: false },];

/// Look up a recognized option by number.
pub fn recognized(number: OptNumber) -> Option<&'static OptSpec> {
  TABLE.iter().find(|spec| spec.number == number)
}

/// RFC 7252 §5.4.6: an option number's parity determines criticality.
pub fn is_critical(number: OptNumber) -> bool {
  number % 2 == 1
}

/// Whether this option may appear at most once on a message. Unrecognized
/// options default to repeatable (least restrictive), matching "unknown
/// elective options are preserved verbatim" — we don't reject an unknown
/// option's cardinality, only a known one's.
pub fn is_non_repeatable(number: OptNumber) -> bool {
  recognized(number).map(|spec| !spec.repeatable).unwrap_or(false)
}

/// Validate a decoded option's value against the recognized-option table.
/// Unrecognized critical options are rejected; unrecognized elective
/// options and unvalidated reprs pass through untouched.
pub fn validate(number: OptNumber, value: &[u8]) -> Result<(), FormatError> {
  match recognized(number) {
    | Some(spec) => {
      if value.len() < spec.min_len || value.len() > spec.max_len {
        return Err(FormatError::OptionLengthOutOfRange { number, len: value.len(), min: spec.min_len, max: spec.max_len });
      }
      if spec.repr == Repr::String && std::str::from_utf8(value).is_err() {
        return Err(FormatError::OptionNotUtf8(number));
      }
      Ok(())
    },
    | None if is_critical(number) => Err(FormatError::UnrecognizedCriticalOption(number)),
    | None => Ok(()),
  }
}

/// Decode a `uint` option value (big-endian, variable length, as CoAP
/// represents all its integer options).
pub fn decode_uint(value: &[u8]) -> u32 {
  value.iter().fold(0u32, |acc, b| (acc << 8) | (*b as u32))
}

/// Encode a `uint` option value, dropping leading zero bytes (CoAP uints
/// are the shortest representation that holds the value).
pub fn encode_uint(value: u32) -> Vec<u8> {
  let bytes = value.to_be_bytes();
  let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(3);
  bytes[first_nonzero..].to_vec()
}

/// Content-Format values recognized by RFC 7252 §12.3.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
  TextPlain,
  LinkFormat,
  Xml,
  OctetStream,
  Exi,
  Json,
  Other(u16),
}

impl From<ContentFormat> for u16 {
  fn from(f: ContentFormat) -> Self {
    match f {
      | ContentFormat::TextPlain => 0,
      | ContentFormat::LinkFormat => 40,
      | ContentFormat::Xml => 41,
      | ContentFormat::OctetStream => 42,
      | ContentFormat::Exi => 47,
      | ContentFormat::Json => 50,
      | ContentFormat::Other(n) => n,
    }
  }
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    match n {
      | 0 => ContentFormat::TextPlain,
      | 40 => ContentFormat::LinkFormat,
      | 41 => ContentFormat::Xml,
      | 42 => ContentFormat::OctetStream,
      | 47 => ContentFormat::Exi,
      | 50 => ContentFormat::Json,
      | other => ContentFormat::Other(other),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn uint_roundtrip() {
    for n in [0u32, 1, 255, 256, 5683, 65535, 16909060] {
      assert_eq!(decode_uint(&encode_uint(n)), n);
    }
  }

  #[test]
  fn criticality_matches_parity() {
    assert!(is_critical(URI_PATH));
    assert!(!is_critical(CONTENT_FORMAT));
  }

  #[test]
  fn unrecognized_critical_option_rejected() {
    assert!(validate(9, &[]).is_err());
  }

  #[test]
  fn unrecognized_elective_option_allowed() {
    assert!(validate(2, &[1, 2, 3]).is_ok());
  }
}
