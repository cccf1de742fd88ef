//! The deferred (separate) response queue (§4.4): when a handler can't
//! answer a CON request within the window that would let the server
//! piggyback the response on the ACK, it empty-ACKs the request
//! immediately and enqueues the eventual response to be sent later as its
//! own CON/NON message.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use crate::msg::Message;

/// A response awaiting transmission outside the original ACK window, along
/// with the peer it's addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSeparate {
  pub message: Message,
  pub addr: SocketAddr,
}

/// FIFO queue of separate responses waiting to go out.
pub struct SeparateResponseQueue {
  queue: Mutex<VecDeque<PendingSeparate>>,
}

impl SeparateResponseQueue {
  pub fn new() -> Self {
    Self { queue: Mutex::new(VecDeque::new()) }
  }

  pub fn add_pending_separate(&self, message: Message, addr: SocketAddr) {
    self.queue.lock().unwrap().push_back(PendingSeparate { message, addr });
  }

  /// Pop the oldest pending separate response, if any.
  pub fn next_pending_separate(&self) -> Option<PendingSeparate> {
    self.queue.lock().unwrap().pop_front()
  }

  pub fn len(&self) -> usize {
    self.queue.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for SeparateResponseQueue {
  fn default() -> Self {
    Self::new()
  }
}
