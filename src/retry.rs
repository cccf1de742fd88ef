//! The confirmable-message retransmission engine: a pending-ACK queue keyed
//! by message ID, each entry carrying its own exponential-backoff deadline
//! (§4.3), plus the bounded message-ID allocator described alongside it.
//!
//! Each entry knows how many times it's fired and what its next deadline
//! is, tracked against a real `std::time::Instant` rather than a generic
//! clock, since this runs on threads with OS-scheduled wakeups rather than
//! cooperative polling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::Config;
use crate::error::Error;
use crate::msg::{Message, MessageId};

/// One CON exchange awaiting its ACK/RST, or an exchange that has
/// permanently failed.
///
/// `addr` is the destination to retransmit to. Client exchanges run over a
/// connected socket and leave it `None`; server-originated CONs (separate
/// responses) carry the peer address they must be resent to.
#[derive(Debug, Clone)]
pub struct PendingEntry {
  pub message: Message,
  pub attempts: u8,
  pub deadline: Instant,
  pub addr: Option<SocketAddr>,
}

/// Outcome of polling the queue for a single timed-out entry.
#[derive(Debug)]
pub enum PollOutcome {
  /// Entry should be retransmitted; its attempt counter and deadline have
  /// already been advanced.
  Retransmit { message: Message, addr: Option<SocketAddr> },
  /// Entry exhausted its retry budget (§4.3: `max_retransmissions`).
  Undelivered { id: MessageId, attempts: u8, message: Box<Message>, addr: Option<SocketAddr> },
}

/// The pending-ACK queue, plus the message-ID allocator that shares its
/// lock: allocating an ID and enrolling its pending entry happen under one
/// critical section, so no other thread can observe an
/// allocated-but-unenrolled ID and hand it out again.
pub struct PendingAckQueue {
  config: Config,
  state: Mutex<State>,
}

struct State {
  entries: HashMap<MessageId, PendingEntry>,
  next_id_hint: u16,
}

impl PendingAckQueue {
  pub fn new(config: Config) -> Self {
    Self { config, state: Mutex::new(State { entries: HashMap::new(), next_id_hint: 0 }) }
  }

  /// Allocate a fresh message ID not currently in flight, and enroll
  /// `message` (already stamped with that ID) as pending its first
  /// transmission deadline. Scans at most 65,536 candidates before giving
  /// up, rather than spinning forever once every ID is in flight.
  pub fn allocate_and_enroll(&self, addr: Option<SocketAddr>, build: impl FnOnce(MessageId) -> Message) -> Result<Message, Error> {
    let mut state = self.state.lock().unwrap();
    let start = state.next_id_hint;
    let mut candidate = start;
    let id = loop {
      if !state.entries.contains_key(&candidate) {
        break candidate;
      }
      candidate = candidate.wrapping_add(1);
      if candidate == start {
        return Err(Error::unsupported("no free message IDs: all 65536 values are in flight"));
      }
    };
    state.next_id_hint = id.wrapping_add(1);

    let message = build(id);
    let deadline = Instant::now() + jittered(self.config.per_attempt_timeout(0));
    state.entries.insert(id, PendingEntry { message: message.clone(), attempts: 0, deadline, addr });
    Ok(message)
  }

  /// Enroll a message whose ID was already chosen by the caller (used when
  /// replaying a message the caller constructed directly rather than via
  /// [`allocate_and_enroll`]). `addr` is the peer to retransmit to, or
  /// `None` when the underlying socket is already connected to its peer.
  pub fn enroll(&self, message: Message, addr: Option<SocketAddr>) {
    let mut state = self.state.lock().unwrap();
    let deadline = Instant::now() + jittered(self.config.per_attempt_timeout(0));
    state.entries.insert(message.id, PendingEntry { message, attempts: 0, deadline, addr });
  }

  /// An ACK or RST arrived for `id`: the exchange is complete, remove it.
  /// Returns the removed entry's message, if any was pending.
  pub fn cancel(&self, id: MessageId) -> Option<Message> {
    self.state.lock().unwrap().entries.remove(&id).map(|e| e.message)
  }

  pub fn is_pending(&self, id: MessageId) -> bool {
    self.state.lock().unwrap().entries.contains_key(&id)
  }

  /// IDs currently enrolled — used by tests and by callers that need to
  /// avoid colliding with in-flight exchanges outside the allocator.
  pub fn snapshot_in_use_ids(&self) -> Vec<MessageId> {
    self.state.lock().unwrap().entries.keys().copied().collect()
  }

  pub fn len(&self) -> usize {
    self.state.lock().unwrap().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Find the single entry whose deadline is soonest past due, if any, and
  /// process it: either bumped to its next attempt (and re-enrolled with a
  /// fresh deadline) or, past `max_retransmissions`, removed and reported as
  /// undelivered. Only one timeout is processed per call, so the lock is
  /// held just long enough to advance or remove one entry (§4.3).
  pub fn poll_timeouts(&self) -> Option<PollOutcome> {
    let now = Instant::now();
    let mut state = self.state.lock().unwrap();
    let id = state.entries
                  .iter()
                  .filter(|(_, e)| e.deadline <= now)
                  .min_by_key(|(_, e)| e.deadline)
                  .map(|(id, _)| *id)?;

    let entry = state.entries.get_mut(&id).expect("id came from this map's own keys");
    if entry.attempts >= self.config.max_retransmissions {
      let removed = state.entries.remove(&id).unwrap();
      Some(PollOutcome::Undelivered { id, attempts: removed.attempts, message: Box::new(removed.message), addr: removed.addr })
    } else {
      entry.attempts += 1;
      entry.deadline = now + jittered(self.config.per_attempt_timeout(entry.attempts));
      Some(PollOutcome::Retransmit { message: entry.message.clone(), addr: entry.addr })
    }
  }

  /// Drop all pending entries (used on endpoint shutdown).
  pub fn shutdown(&self) {
    self.state.lock().unwrap().entries.clear();
  }
}

/// Apply a +/-10% jitter so concurrently-started exchanges don't all poll
/// for retransmission in lockstep.
fn jittered(base: Duration) -> Duration {
  let mut rng = rand::thread_rng();
  let factor = rng.gen_range(0.9..=1.1);
  base.mul_f64(factor)
}
