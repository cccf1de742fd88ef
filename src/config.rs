//! Endpoint tunables, gathered into one struct that implementors construct
//! and pass in, rather than scattered free constants.

use std::time::Duration;

/// `2 * MAX_LATENCY` from RFC 7252 §4.8.2, used to derive `EXCHANGE_LIFETIME`.
const MAX_LATENCY_SECS: f32 = 100.0;

/// Tunables for the retransmission engine and the endpoints' poll loops.
///
/// `Config::default()` matches RFC 7252's suggested defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
  /// Base timeout before the first retransmission of a CON message.
  pub ack_timeout: Duration,

  /// Multiplier applied on top of the exponential backoff to avoid
  /// synchronized retransmission storms across endpoints.
  pub ack_random_factor: f32,

  /// How many times a CON message is retransmitted before being surfaced
  /// as [`crate::Error::Undelivered`].
  pub max_retransmissions: u8,

  /// How often the pending-ACK queue poller wakes to scan for timed-out
  /// entries.
  pub base_timeout: Duration,

  /// How long the client's receive loop blocks on a socket read before
  /// checking its shutdown flag.
  pub client_poll_interval: Duration,

  /// How long the server's receive loop blocks on a socket read while idle.
  pub server_idle_poll_interval: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self { ack_timeout: Duration::from_secs(2),
           ack_random_factor: 1.5,
           max_retransmissions: 4,
           base_timeout: Duration::from_secs(2),
           client_poll_interval: Duration::from_secs(1),
           server_idle_poll_interval: Duration::from_secs(5) }
  }
}

impl Config {
  /// The per-attempt timeout for the `n`th retransmission (`n` = 0 for the
  /// initial send), per §4.3: `base * 2^n * ack_random_factor`.
  pub fn per_attempt_timeout(&self, attempt: u8) -> Duration {
    let exp = 2u32.pow(attempt as u32) as f32;
    self.ack_timeout.mul_f32(exp * self.ack_random_factor)
  }

  /// Upper bound on the total time a CON exchange can be retransmitting,
  /// per §4.3: `(2^max_retransmissions - 1) * ack_timeout * ack_random_factor`.
  pub fn max_transmit_span(&self) -> Duration {
    let factor = (2u32.pow(self.max_retransmissions as u32) - 1) as f32;
    self.ack_timeout.mul_f32(factor * self.ack_random_factor)
  }

  /// Upper bound on how long a message ID may remain associated with a
  /// pending exchange before it's safe to reuse, per §4.3.
  pub fn exchange_lifetime(&self) -> Duration {
    // processing_delay is taken to be one ack_timeout, per RFC 7252 §4.8.2's
    // own use of ACK_TIMEOUT as the processing delay estimate.
    self.max_transmit_span() + self.ack_timeout + Duration::from_secs_f32(2.0 * MAX_LATENCY_SECS)
  }

  /// Upper bound on how long a NON message's message ID needs to be
  /// considered in-flight, per §4.3.
  pub fn non_lifetime(&self) -> Duration {
    self.max_transmit_span() + Duration::from_secs_f32(MAX_LATENCY_SECS)
  }
}
