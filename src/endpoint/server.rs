//! Server role: binds a UDP socket, fans out to many peers via
//! `send_to`, and owns the observer registry and separate-response queue
//! (§4.6).

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::guarded;
use crate::config::Config;
use crate::logging::{Level, Logger};
use crate::msg::{codec, Code, Message, MessageId, Type};
use crate::observe::ObserverRegistry;
use crate::req::Request;
use crate::resp::{self, Response};
use crate::retry::{PendingAckQueue, PollOutcome};
use crate::separate::SeparateResponseQueue;
use crate::Addrd;

/// The shared state a [`RequestHandler`] needs to register observers or
/// defer a response, borrowed for the duration of one `handle` call.
pub struct ServerContext<'a> {
  pub observers: &'a ObserverRegistry,
  pub separate: &'a SeparateResponseQueue,
}

/// Application request handler. Returning `Some(response)` sends it
/// immediately (piggybacked on the ACK for a `Con` request); returning
/// `None` for a `Con` request sends a bare empty ACK, on the assumption the
/// handler has already queued a separate response via `ctx.separate`.
pub trait RequestHandler: Send + Sync {
  fn handle(&self, ctx: &ServerContext, req: Addrd<Request>) -> Option<Response>;

  /// A server-initiated `Con` (a separate response) exhausted its retry
  /// budget without being ACKed. Default is a no-op; override to observe
  /// delivery failures.
  fn on_undelivered(&self, _id: MessageId, _attempts: u8, _message: Message) {}
}

/// A CoAP server endpoint.
pub struct ServerEndpoint {
  socket: Arc<UdpSocket>,
  pending: Arc<PendingAckQueue>,
  observers: Arc<ObserverRegistry>,
  separate: Arc<SeparateResponseQueue>,
  logger: Arc<dyn Logger>,
  shutdown: Arc<AtomicBool>,
  receive_thread: Option<JoinHandle<()>>,
  poller_thread: Option<JoinHandle<()>>,
}

impl ServerEndpoint {
  pub fn bind(addr: impl ToSocketAddrs, config: Config, logger: Arc<dyn Logger>, handler: Arc<dyn RequestHandler>) -> Result<Self, crate::Error> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(config.server_idle_poll_interval))?;
    let socket = Arc::new(socket);
    let pending = Arc::new(PendingAckQueue::new(config));
    let observers = Arc::new(ObserverRegistry::new());
    let separate = Arc::new(SeparateResponseQueue::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_for_poller = handler.clone();

    let receive_thread = {
      let socket = socket.clone();
      let pending = pending.clone();
      let observers = observers.clone();
      let separate = separate.clone();
      let logger = logger.clone();
      let shutdown = shutdown.clone();
      thread::spawn(move || receive_loop(&socket, &pending, &observers, &separate, &*logger, &shutdown, &*handler))
    };

    let poller_thread = {
      let socket = socket.clone();
      let pending = pending.clone();
      let logger = logger.clone();
      let shutdown = shutdown.clone();
      let interval = config.base_timeout;
      let handler = handler_for_poller;
      thread::spawn(move || poller_loop(&socket, &pending, &*logger, &shutdown, interval, &*handler))
    };

    Ok(Self { socket,
              pending,
              observers,
              separate,
              logger,
              shutdown,
              receive_thread: Some(receive_thread),
              poller_thread: Some(poller_thread) })
  }

  pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
    self.socket.local_addr()
  }

  pub fn observers(&self) -> &ObserverRegistry {
    &self.observers
  }

  pub fn add_pending_separate(&self, message: crate::msg::Message, addr: SocketAddr) {
    self.separate.add_pending_separate(message, addr);
  }

  /// Pop and send the oldest queued separate response, if any, enrolling
  /// it in the pending-ACK queue if it's `Con` (§4.5).
  pub fn send_next_pending_separate(&self) -> Result<bool, crate::Error> {
    let Some(pending) = self.separate.next_pending_separate() else {
      return Ok(false);
    };
    if pending.message.ty == Type::Con {
      self.pending.enroll(pending.message.clone(), Some(pending.addr));
    }
    let bytes = codec::encode(&pending.message)?;
    self.socket.send_to(&bytes, pending.addr)?;
    self.logger.log(Level::Debug, &format!("sent separate response id={:#06x} to {}", pending.message.id, pending.addr));
    Ok(true)
  }

  /// Send an unsolicited notification (Observe, §4.4) to every current
  /// observer of `resource`.
  pub fn notify(&self, resource: &str, code: Code, id_source: impl Fn() -> u16, payload: &[u8]) -> Result<usize, crate::Error> {
    let mut sent = 0;
    for observer in self.observers.list(resource) {
      let mut msg = Response::notification(code, id_source(), observer.token.clone()).into_message();
      msg.payload = Some(payload.to_vec());
      let bytes = codec::encode(&msg)?;
      if let Err(e) = self.socket.send_to(&bytes, observer.addr) {
        self.logger.log(Level::Warn,
                         &format!("notify to {} failed, unregistering observer: {e}", observer.addr));
        self.observers.unregister(resource, &observer.token);
        continue;
      }
      sent += 1;
    }
    Ok(sent)
  }

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

impl Drop for ServerEndpoint {
  fn drop(&mut self) {
    self.shutdown.store(true, Ordering::Release);
  }
}

fn receive_loop(socket: &UdpSocket,
                pending: &PendingAckQueue,
                observers: &ObserverRegistry,
                separate: &SeparateResponseQueue,
                logger: &dyn Logger,
                shutdown: &AtomicBool,
                handler: &dyn RequestHandler) {
  let mut buf = [0u8; crate::MAX_MESSAGE_SIZE];
  while !shutdown.load(Ordering::Acquire) {
    match socket.recv_from(&mut buf) {
      | Ok((n, addr)) => handle_datagram(&buf[..n], addr, socket, pending, observers, separate, logger, handler),
      | Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
      | Err(e) => logger.log(Level::Error, &format!("socket read error: {e}")),
    }
  }
}

fn handle_datagram(bytes: &[u8],
                    addr: SocketAddr,
                    socket: &UdpSocket,
                    pending: &PendingAckQueue,
                    observers: &ObserverRegistry,
                    separate: &SeparateResponseQueue,
                    logger: &dyn Logger,
                    handler: &dyn RequestHandler) {
  let decoded = codec::decode(bytes);
  let msg = match decoded {
    | Ok(msg) => msg,
    | Err(e) => {
      logger.log(Level::Warn, &format!("decode failed from {addr}: {e}"));
      if codec::peek_message_type(bytes) == Some(Type::Con) {
        let id = codec::peek_message_id(bytes).unwrap_or(0);
        send(socket, addr, Response::reset_with_code(id, resp::BAD_REQUEST), logger);
      }
      return;
    },
  };

  logger.log(Level::Debug, &format!("recv id={:#06x} ty={:?} code={} from {addr}", msg.id, msg.ty, msg.code));

  if msg.ty == Type::Rst {
    pending.cancel(msg.id);
    observers.unregister_by_token(&msg.token);
    return;
  }
  if msg.ty == Type::Ack {
    pending.cancel(msg.id);
    return;
  }

  // Only Con/Non remain.
  if msg.ty == Type::Con && msg.code.is_empty() {
    send(socket, addr, Response::reset(msg.id), logger);
    return;
  }

  if !msg.code.is_request() {
    logger.log(Level::Warn, &format!("unexpected code {} on a {:?} from {addr}", msg.code, msg.ty));
    return;
  }

  let is_con = msg.ty == Type::Con;
  let id = msg.id;
  let token = msg.token.clone();
  let req = match Request::from_message(msg) {
    | Ok(r) => r,
    | Err(e) => {
      logger.log(Level::Warn, &format!("malformed request from {addr}: {e}"));
      if is_con {
        send(socket, addr, Response::reset_with_code(id, resp::BAD_REQUEST), logger);
      }
      return;
    },
  };

  let ctx = ServerContext { observers, separate };
  let mut reply = None;
  guarded(logger, "handle", || reply = handler.handle(&ctx, Addrd(req, addr)));

  match reply {
    | Some(resp) => send(socket, addr, resp, logger),
    | None if is_con => send(socket, addr, Response::empty_ack(id, token), logger),
    | None => {},
  }
}

fn send(socket: &UdpSocket, addr: SocketAddr, resp: Response, logger: &dyn Logger) {
  let msg = resp.into_message();
  match codec::encode(&msg) {
    | Ok(bytes) => {
      if let Err(e) = socket.send_to(&bytes, addr) {
        logger.log(Level::Error, &format!("send_to {addr} failed: {e}"));
      }
    },
    | Err(e) => logger.log(Level::Error, &format!("failed to encode reply to {addr}: {e}")),
  }
}

fn poller_loop(socket: &UdpSocket,
               pending: &PendingAckQueue,
               logger: &dyn Logger,
               shutdown: &AtomicBool,
               interval: std::time::Duration,
               handler: &dyn RequestHandler) {
  while !shutdown.load(Ordering::Acquire) {
    thread::sleep(interval);
    if let Some(outcome) = pending.poll_timeouts() {
      match outcome {
        | PollOutcome::Retransmit { message, addr } => match addr {
          | Some(addr) => {
            logger.log(Level::Info, &format!("retransmitting id={:#06x} to {addr}", message.id));
            match codec::encode(&message) {
              | Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, addr) {
                  logger.log(Level::Error, &format!("retransmit to {addr} failed: {e}"));
                }
              },
              | Err(e) => logger.log(Level::Error, &format!("failed to encode retransmit: {e}")),
            }
          },
          | None => {
            logger.log(Level::Warn,
                        &format!("id={:#06x} due for retransmission but no peer address was recorded", message.id));
          },
        },
        | PollOutcome::Undelivered { id, attempts, message, .. } => {
          logger.log(Level::Warn, &format!("id={id:#06x} undelivered after {attempts} attempts"));
          guarded(logger, "on_undelivered", || handler.on_undelivered(id, attempts, (*message).clone()));
        },
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::msg::Token;
  use crate::resp::CONTENT;

  struct EchoHandler;
  impl RequestHandler for EchoHandler {
    fn handle(&self, _ctx: &ServerContext, req: Addrd<Request>) -> Option<Response> {
      let mut resp = Response::for_request(req.data(), CONTENT);
      resp.set_payload(b"ok".to_vec());
      Some(resp)
    }
  }

  #[test]
  fn bind_and_shutdown() {
    let logger: Arc<dyn Logger> = Arc::new(crate::logging::NopLogger);
    let mut server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), logger, Arc::new(EchoHandler)).unwrap();
    assert!(server.local_addr().is_ok());
    server.shutdown();
  }

  #[test]
  fn separate_queue_starts_empty() {
    let logger: Arc<dyn Logger> = Arc::new(crate::logging::NopLogger);
    let mut server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), logger, Arc::new(EchoHandler)).unwrap();
    assert!(!server.send_next_pending_separate().unwrap());
    server.add_pending_separate(crate::msg::Message::new(Type::Con, CONTENT, 1, Token::empty()), "127.0.0.1:1".parse().unwrap());
    assert!(server.send_next_pending_separate().unwrap());
    server.shutdown();
  }
}
