//! `ribbit` is a Rust implementation of the Constrained Application
//! Protocol ([RFC 7252](https://datatracker.ietf.org/doc/html/rfc7252)):
//! a request/response protocol modeled on REST, built for devices too
//! constrained to carry the weight of HTTP.
//!
//! ## What's here
//! - [`msg`]: the wire codec — encoding and decoding the CoAP binary frame.
//! - [`req`] / [`resp`]: typed request and response envelopes built on top
//!   of the codec, with URI and Location-\* binding.
//! - [`retry`]: the confirmable-message retransmission engine.
//! - [`observe`]: the server-side subscriber registry for RFC 7641 Observe.
//! - [`separate`]: the deferred (separate) response queue.
//! - [`endpoint`]: the client and server endpoints that own a socket, a
//!   receive thread, and a retransmission-timeout poller thread.
//!
//! ## Non-goals
//! DTLS (the `coaps` scheme is recognized but no cryptography is performed),
//! block-wise transfer, multicast leisure/congestion control, proxying, and
//! observe sequence ordering are all out of scope. See `SPEC_FULL.md` in the
//! repository root for the full design rationale.

#![deny(unreachable_pub)]

/// Configuration and tunables (ACK timeout, retransmission backoff, poll
/// intervals).
pub mod config;

/// Endpoint dispatcher: client and server roles.
pub mod endpoint;

/// Error kinds surfaced by every layer of the library.
pub mod error;

/// Pluggable logging sink.
pub mod logging;

/// Wire codec and the shared message frame.
pub mod msg;

/// RFC 7641 Observe subscriber registry.
pub mod observe;

/// CoAP request envelope and URI binding.
pub mod req;

/// CoAP response envelope and Location-\* binding.
pub mod resp;

/// Confirmable-message retransmission engine (pending-ACK queue).
pub mod retry;

/// Deferred (separate) response queue.
pub mod separate;

/// URL parsing and rendering for the `coap[s]://` scheme.
pub mod url;

pub use config::Config;
pub use error::Error;
pub use msg::{Code, Message, Token, Type};
pub use req::Request;
pub use resp::Response;

/// Default CoAP UDP port, per RFC 7252 §1.
pub const DEFAULT_PORT: u16 = 5683;

/// Maximum size in bytes of a single CoAP datagram in this implementation.
///
/// RFC 7252 leaves this to the transport; block-wise transfer is the
/// standard's answer for larger payloads. This library doesn't implement
/// block-wise transfer, so messages that would exceed this cap are
/// rejected at encode time with [`error::Error::Unsupported`].
pub const MAX_MESSAGE_SIZE: usize = 256;

/// A piece of data tagged with the remote peer address it came from (or is
/// headed to).
///
/// Mirrors the shape every inbound datagram and outbound server response
/// needs: the payload plus who it's addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addrd<T>(pub T, pub std::net::SocketAddr);

impl<T> Addrd<T> {
  /// The address this data is addressed to or from.
  pub fn addr(&self) -> std::net::SocketAddr {
    self.1
  }

  /// Borrow the wrapped data.
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Discard the address and take the wrapped data.
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Map the wrapped data, keeping the address.
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }
}
