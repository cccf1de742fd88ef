//! Client role: a connected UDP socket talking to one peer (§4.6).

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::{guarded, Handler};
use crate::config::Config;
use crate::error::Error;
use crate::logging::{Level, Logger};
use crate::msg::{codec, Message, Type};
use crate::retry::{PendingAckQueue, PollOutcome};
use crate::Addrd;

/// A handler that forwards every response onto a channel instead of
/// invoking callbacks — what [`ClientEndpoint::connect_sync`] installs to
/// back the synchronous `receive()` API (§6: "Synchronous client variant
/// ... in lieu of callbacks").
struct ChannelHandler {
  tx: Mutex<Sender<Message>>,
}

impl Handler for ChannelHandler {
  fn on_response(&self, resp: Addrd<Message>) {
    let _ = self.tx.lock().unwrap().send(resp.unwrap());
  }
}

/// A CoAP client endpoint: one connected socket, one receive thread, one
/// retransmission-poller thread.
pub struct ClientEndpoint {
  socket: Arc<UdpSocket>,
  pending: Arc<PendingAckQueue>,
  logger: Arc<dyn Logger>,
  shutdown: Arc<AtomicBool>,
  receive_thread: Option<JoinHandle<()>>,
  poller_thread: Option<JoinHandle<()>>,
  rx: Option<Receiver<Message>>,
}

impl ClientEndpoint {
  /// Callback-driven client: `handler` is invoked from the receive thread
  /// for every inbound request, response, and error.
  pub fn connect(host: &str, port: u16, config: Config, logger: Arc<dyn Logger>, handler: Arc<dyn Handler>) -> Result<Self, Error> {
    Self::new(host, port, config, logger, handler, None)
  }

  /// Synchronous client: responses are pulled via [`ClientEndpoint::receive`]
  /// instead of a callback.
  pub fn connect_sync(host: &str, port: u16, config: Config, logger: Arc<dyn Logger>) -> Result<Self, Error> {
    let (tx, rx) = mpsc::channel();
    let handler: Arc<dyn Handler> = Arc::new(ChannelHandler { tx: Mutex::new(tx) });
    Self::new(host, port, config, logger, handler, Some(rx))
  }

  fn new(host: &str,
         port: u16,
         config: Config,
         logger: Arc<dyn Logger>,
         handler: Arc<dyn Handler>,
         rx: Option<Receiver<Message>>)
         -> Result<Self, Error> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((host, port))?;
    socket.set_read_timeout(Some(config.client_poll_interval))?;
    let socket = Arc::new(socket);
    let pending = Arc::new(PendingAckQueue::new(config));
    let shutdown = Arc::new(AtomicBool::new(false));

    let handler_for_poller = handler.clone();

    let receive_thread = {
      let socket = socket.clone();
      let pending = pending.clone();
      let logger = logger.clone();
      let shutdown = shutdown.clone();
      thread::spawn(move || receive_loop(&socket, &pending, &*logger, &shutdown, &*handler))
    };

    let poller_thread = {
      let socket = socket.clone();
      let pending = pending.clone();
      let logger = logger.clone();
      let shutdown = shutdown.clone();
      let interval = config.base_timeout;
      let handler = handler_for_poller.clone();
      thread::spawn(move || poller_loop(&socket, &pending, &*logger, &shutdown, interval, &*handler))
    };

    Ok(Self { socket,
              pending,
              logger,
              shutdown,
              receive_thread: Some(receive_thread),
              poller_thread: Some(poller_thread),
              rx })
  }

  /// Encode and send `msg`. If `msg` is `Con`, enrolls it in the pending-ACK
  /// queue first; a send failure cancels that enrollment (§4.6, §7).
  pub fn send(&self, msg: Message) -> Result<usize, Error> {
    if msg.ty == Type::Con {
      self.pending.enroll(msg.clone(), None);
    }
    let bytes = codec::encode(&msg)?;
    self.logger.log(Level::Debug, &format!("send id={:#06x} ty={:?} code={}", msg.id, msg.ty, msg.code));
    match self.socket.send(&bytes) {
      | Ok(n) => Ok(n),
      | Err(e) => {
        if msg.ty == Type::Con {
          self.pending.cancel(msg.id);
        }
        self.logger.log(Level::Error, &format!("send failed: {e}"));
        Err(Error::Io(e))
      },
    }
  }

  /// Build a message with a freshly-allocated, non-colliding message ID
  /// and send it in one step, under the pending-queue's mutex the whole
  /// time (§9: allocation and enrollment must be atomic with respect to
  /// other callers).
  pub fn request(&self, build: impl FnOnce(u16) -> Message) -> Result<Message, Error> {
    let msg = self.pending.allocate_and_enroll(None, build)?;
    let bytes = codec::encode(&msg)?;
    self.logger.log(Level::Debug, &format!("send id={:#06x} ty={:?} code={}", msg.id, msg.ty, msg.code));
    if let Err(e) = self.socket.send(&bytes) {
      self.pending.cancel(msg.id);
      self.logger.log(Level::Error, &format!("send failed: {e}"));
      return Err(Error::Io(e));
    }
    Ok(msg)
  }

  /// Synchronous receive, for clients constructed with
  /// [`ClientEndpoint::connect_sync`]. Blocks up to `timeout_ms`; returns
  /// `None` and leaves `timed_out` set on timeout rather than erroring.
  pub fn receive(&self, timeout_ms: u64, timed_out: &mut bool) -> Option<Message> {
    *timed_out = false;
    let Some(rx) = &self.rx else {
      self.logger.log(Level::Warn, "receive() called on a callback-driven client");
      *timed_out = true;
      return None;
    };
    match rx.recv_timeout(std::time::Duration::from_millis(timeout_ms)) {
      | Ok(msg) => Some(msg),
      | Err(_) => {
        *timed_out = true;
        None
      },
    }
  }

  /// IDs currently awaiting an ACK/RST.
  pub fn snapshot_in_use_ids(&self) -> Vec<u16> {
    self.pending.snapshot_in_use_ids()
  }

  /// Signal both threads to exit and wait for them to do so.
  pub fn shutdown(&mut self) {
    self.shutdown.store(true, Ordering::Release);
    self.pending.shutdown();
    if let Some(h) = self.receive_thread.take() {
      let _ = h.join();
    }
    if let Some(h) = self.poller_thread.take() {
      let _ = h.join();
    }
  }
}

impl Drop for ClientEndpoint {
  fn drop(&mut self) {
    self.shutdown.store(true, Ordering::Release);
  }
}

fn receive_loop(socket: &UdpSocket, pending: &PendingAckQueue, logger: &dyn Logger, shutdown: &AtomicBool, handler: &dyn Handler) {
  let peer = socket.peer_addr().ok();
  let mut buf = [0u8; crate::MAX_MESSAGE_SIZE];
  while !shutdown.load(Ordering::Acquire) {
    match socket.recv(&mut buf) {
      | Ok(n) => handle_datagram(&buf[..n], peer, pending, logger, handler),
      | Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
      | Err(e) => {
        logger.log(Level::Error, &format!("socket read error: {e}"));
        guarded(logger, "on_error", || handler.on_error(Error::Io(e), None));
      },
    }
  }
}

fn handle_datagram(bytes: &[u8], peer: Option<std::net::SocketAddr>, pending: &PendingAckQueue, logger: &dyn Logger, handler: &dyn Handler) {
  let addr = peer.unwrap_or_else(|| "0.0.0.0:0".parse().unwrap());
  match codec::decode(bytes) {
    | Ok(msg) => {
      logger.log(Level::Debug, &format!("recv id={:#06x} ty={:?} code={}", msg.id, msg.ty, msg.code));
      if matches!(msg.ty, Type::Ack | Type::Rst) {
        pending.cancel(msg.id);
      }
      if msg.code.is_request() {
        guarded(logger, "on_request", || handler.on_request(Addrd(msg.clone(), addr)));
      } else {
        guarded(logger, "on_response", || handler.on_response(Addrd(msg, addr)));
      }
    },
    | Err(e) => {
      logger.log(Level::Warn, &format!("decode failed: {e}"));
      guarded(logger, "on_error", || handler.on_error(Error::Format(e), None));
    },
  }
}

fn poller_loop(socket: &UdpSocket, pending: &PendingAckQueue, logger: &dyn Logger, shutdown: &AtomicBool, interval: std::time::Duration, handler: &dyn Handler) {
  while !shutdown.load(Ordering::Acquire) {
    thread::sleep(interval);
    if let Some(outcome) = pending.poll_timeouts() {
      match outcome {
        | PollOutcome::Retransmit { message, .. } => {
          logger.log(Level::Info, &format!("retransmitting id={:#06x}", message.id));
          if let Ok(bytes) = codec::encode(&message) {
            let _ = socket.send(&bytes);
          }
        },
        | PollOutcome::Undelivered { id, attempts, message, .. } => {
          logger.log(Level::Warn, &format!("id={id:#06x} undelivered after {attempts} attempts"));
          let msg_for_callback = (*message).clone();
          let err = Error::Undelivered { id, attempts, message };
          guarded(logger, "on_error", || handler.on_error(err, Some(msg_for_callback)));
        },
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::msg::{Code, Token};

  #[test]
  fn connect_sync_binds_and_reports_timeout() {
    let logger: Arc<dyn Logger> = Arc::new(crate::logging::NopLogger);
    // There's nobody listening on this port; connect() over UDP never
    // actually dials, so this always succeeds.
    let mut client = ClientEndpoint::connect_sync("127.0.0.1", 9, Config::default(), logger).unwrap();
    let mut timed_out = false;
    let got = client.receive(10, &mut timed_out);
    assert!(got.is_none());
    assert!(timed_out);
    client.shutdown();
  }

  #[test]
  fn send_enrolls_con_and_request_allocates_id() {
    let logger: Arc<dyn Logger> = Arc::new(crate::logging::NopLogger);
    let mut client = ClientEndpoint::connect_sync("127.0.0.1", 9, Config::default(), logger).unwrap();
    let sent = client.request(|id| Message::new(Type::Con, Code::new(0, 1), id, Token::empty())).unwrap();
    assert!(client.snapshot_in_use_ids().contains(&sent.id));
    client.shutdown();
  }

  struct RecordingHandler {
    undelivered: Mutex<Vec<u16>>,
  }

  impl Handler for RecordingHandler {
    fn on_error(&self, err: Error, _msg: Option<Message>) {
      if let Error::Undelivered { id, .. } = err {
        self.undelivered.lock().unwrap().push(id);
      }
    }
  }

  #[test]
  fn undelivered_con_reaches_on_error() {
    let logger: Arc<dyn Logger> = Arc::new(crate::logging::NopLogger);
    let handler = Arc::new(RecordingHandler { undelivered: Mutex::new(Vec::new()) });
    let config = Config { ack_timeout: std::time::Duration::from_millis(1),
                          max_retransmissions: 1,
                          base_timeout: std::time::Duration::from_millis(1),
                          ..Config::default() };
    // Port 9 (discard) never ACKs, so the exchange is guaranteed to exhaust
    // its retransmission budget.
    let mut client = ClientEndpoint::connect("127.0.0.1", 9, config, logger, handler.clone()).unwrap();
    client.request(|id| Message::new(Type::Con, Code::new(0, 1), id, Token::empty())).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while handler.undelivered.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
      thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(!handler.undelivered.lock().unwrap().is_empty(), "expected on_error to observe an Undelivered message");
    client.shutdown();
  }
}
