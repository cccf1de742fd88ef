//! Client and server endpoint dispatchers (§4.6): socket ownership, the
//! send path, the receive loop, dispatch to application code, and
//! retransmission.
//!
//! Both roles share the same thread discipline (§5): one receive thread,
//! one queue-poller thread, and whichever caller threads invoke `send`.
//! That shared shape lives here; [`client`] and [`server`] each build their
//! own dispatch logic on top of it since a client only ever talks to one
//! peer while a server fans out to many and owns the observer/separate
//! response state.

pub mod client;
pub mod server;

use std::panic::{self, AssertUnwindSafe};

use crate::logging::{Level, Logger};
use crate::msg::Message;
use crate::Addrd;

pub use client::ClientEndpoint;
pub use server::{RequestHandler, ServerContext, ServerEndpoint};

/// Application callback surface for a client endpoint, matching §4.6's
/// "request-received, response-received, error" callback set. Every method
/// has a no-op default so a handler only needs to implement the callbacks
/// it cares about.
pub trait Handler: Send + Sync {
  fn on_request(&self, _req: Addrd<Message>) {}
  fn on_response(&self, _resp: Addrd<Message>) {}
  fn on_error(&self, _err: crate::Error, _msg: Option<Message>) {}
}

/// Run `f`, catching any panic and logging it rather than letting it
/// unwind into the receive/poller thread (§5, "Failure isolation").
pub(crate) fn guarded(logger: &dyn Logger, label: &str, f: impl FnOnce()) {
  if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
    logger.log(Level::Error, &format!("{label} callback panicked; continuing"));
  }
}
