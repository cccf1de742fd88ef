//! End-to-end scenarios over real loopback UDP sockets and real threads
//! (§8's "End-to-end scenarios").

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ribbit::endpoint::{ClientEndpoint, Handler, RequestHandler, ServerContext, ServerEndpoint};
use ribbit::logging::NopLogger;
use ribbit::msg::{codec, Code, Message, Token, Type};
use ribbit::req::{Method, Request};
use ribbit::resp::{self, Response};
use ribbit::{Addrd, Config, Error};

struct EchoTime;

impl RequestHandler for EchoTime {
  fn handle(&self, _ctx: &ServerContext, req: Addrd<Request>) -> Option<Response> {
    let mut resp = Response::for_request(req.data(), resp::CONTENT);
    resp.set_payload(b"12:00".to_vec());
    Some(resp)
  }
}

fn nop_logger() -> Arc<NopLogger> {
  Arc::new(NopLogger)
}

#[test]
fn ping_gets_reset_and_clears_pending_id() {
  let mut server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), nop_logger(), Arc::new(EchoTime)).unwrap();
  let server_addr = server.local_addr().unwrap();

  let mut client = ClientEndpoint::connect_sync("127.0.0.1", server_addr.port(), Config::default(), nop_logger()).unwrap();

  let ping = Message::new(Type::Con, Code::EMPTY, 0x1234, Token::empty());
  client.send(ping).unwrap();
  assert!(client.snapshot_in_use_ids().contains(&0x1234));

  let mut timed_out = false;
  let reply = client.receive(2000, &mut timed_out);
  assert!(!timed_out, "expected a reply within 2s");
  let reply = reply.expect("expected a reset reply");
  assert_eq!(reply.ty, Type::Rst);
  assert_eq!(reply.id, 0x1234);
  assert!(reply.code.is_empty());

  std::thread::sleep(Duration::from_millis(50));
  assert!(!client.snapshot_in_use_ids().contains(&0x1234));

  client.shutdown();
  server.shutdown();
}

#[test]
fn get_with_uri_encodes_expected_options() {
  let req = Request::new(Method::Get, "coap://192.0.2.1:5683/time", 7, Token::empty(), false).unwrap();
  let bytes = codec::encode(req.message()).unwrap();
  let decoded = codec::decode(&bytes).unwrap();

  let host = decoded.option_value(ribbit::msg::option::URI_HOST).unwrap();
  assert_eq!(host, b"192.0.2.1");
  let path = decoded.option_value(ribbit::msg::option::URI_PATH).unwrap();
  assert_eq!(path, b"time");
  // Default port 5683 is elided rather than encoded, per the URL binder.
  assert!(decoded.option_value(ribbit::msg::option::URI_PORT).is_none());
}

#[test]
fn bad_con_gets_bad_request_reset_and_server_continues() {
  let mut server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), nop_logger(), Arc::new(EchoTime)).unwrap();
  let server_addr = server.local_addr().unwrap();

  let client_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
  client_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  // Hand-build a CON GET whose single option is critical and unrecognized
  // (option 19 is odd and has no recognized-table entry) so decode fails
  // on the server. Delta 19 needs the one-byte nibble extension (13 + 6).
  let mut bytes = vec![(1u8 << 6) | (0 << 4) | 0, Code::new(0, 1).byte(), 0x00, 0x2A];
  bytes.push((13u8 << 4) | 0); // delta nibble 13 (extended), zero-length value
  bytes.push(6); // 13 + 6 = option number 19
  client_socket.send_to(&bytes, server_addr).unwrap();

  let mut buf = [0u8; 64];
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let reply = codec::decode(&buf[..n]).unwrap();
  assert_eq!(reply.ty, Type::Rst);
  assert_eq!(reply.id, 0x002A);
  assert_eq!(reply.code, resp::BAD_REQUEST);

  // Server should still be alive for a subsequent well-formed ping.
  let ping = Message::new(Type::Con, Code::EMPTY, 0x5, Token::empty());
  client_socket.send_to(&codec::encode(&ping).unwrap(), server_addr).unwrap();
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let reply2 = codec::decode(&buf[..n]).unwrap();
  assert_eq!(reply2.ty, Type::Rst);
  assert_eq!(reply2.id, 0x5);

  server.shutdown();
}

#[test]
fn separate_response_is_correlated_by_token() {
  let mut server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), nop_logger(), Arc::new(DeferringHandler)).unwrap();
  let server_addr = server.local_addr().unwrap();

  let client_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
  client_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let token = Token::new(vec![0xAB]).unwrap();
  let req = Request::new(Method::Get, "coap://ignored/slow", 100, token.clone(), false).unwrap();
  client_socket.send_to(&codec::encode(req.message()).unwrap(), server_addr).unwrap();

  let mut buf = [0u8; 64];
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let ack = codec::decode(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);
  assert_eq!(ack.id, 100);
  assert!(ack.code.is_empty());

  // drain the queued separate response onto the wire
  while !server.send_next_pending_separate().unwrap() {
    std::thread::sleep(Duration::from_millis(10));
  }

  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let separate = codec::decode(&buf[..n]).unwrap();
  assert_eq!(separate.code, resp::CONTENT);
  assert_eq!(separate.token, token);
  assert_eq!(separate.payload_bytes(), b"42");

  server.shutdown();
}

struct DeferringHandler;
impl RequestHandler for DeferringHandler {
  fn handle(&self, ctx: &ServerContext, req: Addrd<Request>) -> Option<Response> {
    let mut separate_msg = Message::new(Type::Con, resp::CONTENT, 200, req.data().token().clone());
    separate_msg.payload = Some(b"42".to_vec());
    ctx.separate.add_pending_separate(separate_msg, req.addr());
    None
  }
}

#[test]
fn observe_registers_and_delivers_then_unregisters_on_reset() {
  let server = ServerEndpoint::bind("127.0.0.1:0", Config::default(), nop_logger(), Arc::new(ObserveHandler)).unwrap();
  let server_addr = server.local_addr().unwrap();

  let client_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
  client_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let token = Token::new(vec![0xCD]).unwrap();
  let req = Request::new(Method::Get, "coap://ignored/temp", 1, token.clone(), false).unwrap();
  let mut msg = req.into_message();
  msg.push_option(ribbit::msg::option::OBSERVE, vec![0]).unwrap();
  client_socket.send_to(&codec::encode(&msg).unwrap(), server_addr).unwrap();

  let mut buf = [0u8; 64];
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let ack = codec::decode(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);

  assert_eq!(server.observers().list("temp").len(), 1);

  let sent = server.notify("temp", resp::CONTENT, || 500, b"72F").unwrap();
  assert_eq!(sent, 1);

  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let notif = codec::decode(&buf[..n]).unwrap();
  assert_eq!(notif.ty, Type::Non);
  assert_eq!(notif.token, token);
  assert_eq!(notif.payload_bytes(), b"72F");

  let rst = Message::new(Type::Rst, Code::EMPTY, notif.id, token.clone());
  client_socket.send_to(&codec::encode(&rst).unwrap(), server_addr).unwrap();
  std::thread::sleep(Duration::from_millis(100));
  assert_eq!(server.observers().list("temp").len(), 0);
}

struct ObserveHandler;
impl RequestHandler for ObserveHandler {
  fn handle(&self, ctx: &ServerContext, req: Addrd<Request>) -> Option<Response> {
    if req.data().message().option_value(ribbit::msg::option::OBSERVE).is_some() {
      ctx.observers.register("temp", req.data().token().clone(), req.addr());
    }
    Some(Response::for_request(req.data(), resp::CONTENT))
  }
}

struct RecordingHandler {
  undelivered: Mutex<Vec<(u16, u8)>>,
}

impl Handler for RecordingHandler {
  fn on_error(&self, err: Error, _msg: Option<Message>) {
    if let Error::Undelivered { id, attempts, .. } = err {
      self.undelivered.lock().unwrap().push((id, attempts));
    }
  }
}

#[test]
fn retransmit_then_undelivered_reaches_on_error() {
  let config = Config { ack_timeout: Duration::from_millis(5),
                        max_retransmissions: 2,
                        base_timeout: Duration::from_millis(5),
                        ..Config::default() };
  let handler = Arc::new(RecordingHandler { undelivered: Mutex::new(Vec::new()) });
  // Nobody listens on the discard port, so the CON is never ACKed.
  let mut client = ClientEndpoint::connect("127.0.0.1", 9, config, nop_logger(), handler.clone()).unwrap();
  client.request(|id| Message::new(Type::Con, Code::new(0, 1), id, Token::empty())).unwrap();

  let deadline = std::time::Instant::now() + Duration::from_secs(2);
  while handler.undelivered.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
    std::thread::sleep(Duration::from_millis(10));
  }
  let recorded = handler.undelivered.lock().unwrap().clone();
  assert_eq!(recorded.len(), 1, "expected exactly one Undelivered callback");
  assert_eq!(recorded[0].1, 2, "expected max_retransmissions attempts before giving up");

  client.shutdown();
}

struct RecordingServerHandler {
  undelivered: Mutex<Vec<(u16, u8)>>,
}

impl RequestHandler for RecordingServerHandler {
  fn handle(&self, ctx: &ServerContext, req: Addrd<Request>) -> Option<Response> {
    let mut separate_msg = Message::new(Type::Con, resp::CONTENT, 900, req.data().token().clone());
    separate_msg.payload = Some(b"late".to_vec());
    ctx.separate.add_pending_separate(separate_msg, req.addr());
    None
  }

  fn on_undelivered(&self, id: u16, attempts: u8, _message: Message) {
    self.undelivered.lock().unwrap().push((id, attempts));
  }
}

#[test]
fn server_con_retransmits_to_wire_then_reaches_on_undelivered() {
  let config = Config { ack_timeout: Duration::from_millis(5),
                        max_retransmissions: 1,
                        base_timeout: Duration::from_millis(5),
                        ..Config::default() };
  let handler = Arc::new(RecordingServerHandler { undelivered: Mutex::new(Vec::new()) });
  let mut server = ServerEndpoint::bind("127.0.0.1:0", config, nop_logger(), handler.clone()).unwrap();
  let server_addr = server.local_addr().unwrap();

  let client_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
  client_socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  let token = Token::new(vec![0xEE]).unwrap();
  let req = Request::new(Method::Get, "coap://ignored/late", 300, token.clone(), false).unwrap();
  client_socket.send_to(&codec::encode(req.message()).unwrap(), server_addr).unwrap();

  let mut buf = [0u8; 64];
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let ack = codec::decode(&buf[..n]).unwrap();
  assert_eq!(ack.ty, Type::Ack);

  while !server.send_next_pending_separate().unwrap() {
    std::thread::sleep(Duration::from_millis(10));
  }

  // First delivery of the separate response, straight off the queue.
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let first = codec::decode(&buf[..n]).unwrap();
  assert_eq!(first.token, token);
  assert_eq!(first.payload_bytes(), b"late");

  // Nobody ACKs it, so the poller must retransmit the same bytes to the
  // same peer address without being told to again.
  let (n, _) = client_socket.recv_from(&mut buf).unwrap();
  let retransmit = codec::decode(&buf[..n]).unwrap();
  assert_eq!(retransmit.id, first.id);
  assert_eq!(retransmit.payload_bytes(), b"late");

  let deadline = std::time::Instant::now() + Duration::from_secs(2);
  while handler.undelivered.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
    std::thread::sleep(Duration::from_millis(10));
  }
  let recorded = handler.undelivered.lock().unwrap().clone();
  assert_eq!(recorded.len(), 1, "expected exactly one on_undelivered callback");
  assert_eq!(recorded[0].0, first.id);

  server.shutdown();
}
