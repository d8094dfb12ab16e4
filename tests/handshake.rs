//! Handshake behavior against a scripted in-memory transport.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use ws_upgrade::{
    ClientConfig, CloseCode, Error, NonceSource, Poll, ReadyState, Transport, WebSocketClient,
};

/// Accept value matching the RFC 6455 sample nonce.
const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

struct FixedNonce([u8; 16]);

impl NonceSource for FixedNonce {
    fn nonce(&mut self) -> [u8; 16] {
        self.0
    }
}

/// Transport fed from a canned server reply, recording everything the
/// client does to it.
#[derive(Default)]
struct ScriptedTransport {
    refuse_connect: bool,
    response: VecDeque<u8>,
    written: Vec<u8>,
    connected: bool,
    connects: u32,
    closes: u32,
}

impl ScriptedTransport {
    fn responding_with(response: &str) -> Self {
        ScriptedTransport { response: response.bytes().collect(), ..Default::default() }
    }

    fn refusing() -> Self {
        ScriptedTransport { refuse_connect: true, ..Default::default() }
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, _host: &str, _port: u16) -> bool {
        self.connects += 1;
        if self.refuse_connect {
            return false;
        }
        self.connected = true;
        true
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn available(&mut self) -> usize {
        self.response.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.response.pop_front()
    }

    fn write_line(&mut self, line: &[u8]) {
        self.written.extend_from_slice(line);
        self.written.extend_from_slice(b"\r\n");
    }

    fn flush(&mut self) {}

    fn close(&mut self) {
        if self.connected {
            self.closes += 1;
        }
        self.connected = false;
    }
}

fn fast_config() -> ClientConfig {
    ClientConfig { response_wait_attempts: 3, response_wait_interval: Duration::from_millis(1) }
}

fn client_over(transport: ScriptedTransport) -> WebSocketClient<ScriptedTransport> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut client = WebSocketClient::with_config(transport, fast_config());
    client.set_nonce_source(FixedNonce(*b"the sample nonce"));
    client
}

fn valid_response(extra_headers: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n\
         {extra_headers}\r\n"
    )
}

#[test]
fn opens_on_valid_response() {
    let mut client = client_over(ScriptedTransport::responding_with(&valid_response("")));
    let opened = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&opened);
    client.on_open(move |_| seen.set(seen.get() + 1));

    client.open("example.com", 8000, "/chat", None).unwrap();

    assert_eq!(client.ready_state(), ReadyState::Open);
    assert_eq!(client.protocol(), None);
    assert_eq!(opened.get(), 1);
}

#[test]
fn emits_byte_exact_request() {
    let mut client = client_over(ScriptedTransport::responding_with(&valid_response("")));
    client.open("example.com", 8000, "/chat", None).unwrap();

    let expected = "GET /chat HTTP/1.1\r\n\
                    Host: example.com:8000\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                    Sec-WebSocket-Version: 13\r\n\
                    \r\n";
    assert_eq!(client.get_ref().written, expected.as_bytes());
}

#[test]
fn offers_and_adopts_subprotocol() {
    let response = valid_response("Sec-WebSocket-Protocol: chat\r\n");
    let mut client = client_over(ScriptedTransport::responding_with(&response));
    let negotiated = Rc::new(RefCell::new(None::<String>));
    let slot = Rc::clone(&negotiated);
    client.on_open(move |protocol| *slot.borrow_mut() = protocol.map(str::to_owned));

    client.open("example.com", 8000, "/chat", Some("chat, superchat")).unwrap();

    let written = String::from_utf8(client.get_ref().written.clone()).unwrap();
    assert!(written.contains("Sec-WebSocket-Protocol: chat, superchat\r\n"));
    assert_eq!(client.protocol(), Some("chat"));
    assert_eq!(negotiated.borrow().as_deref(), Some("chat"));
}

#[test]
fn rejects_response_without_upgrade_header() {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n\
         \r\n"
    );
    let mut client = client_over(ScriptedTransport::responding_with(&response));
    let errors = Rc::new(RefCell::new(Vec::new()));
    let slot = Rc::clone(&errors);
    client.on_error(move |cause| slot.borrow_mut().push(cause));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();

    assert_eq!(err, Error::UpgradeRequired);
    assert_eq!(client.ready_state(), ReadyState::Closed);
    assert_eq!(*errors.borrow(), vec![Error::UpgradeRequired]);
}

#[test]
fn rejects_mismatched_accept_value() {
    let response = "HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\
                    \r\n";
    let mut client = client_over(ScriptedTransport::responding_with(response));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();

    assert_eq!(err, Error::BadRequest);
    assert_eq!(client.ready_state(), ReadyState::Closed);
}

#[test]
fn bad_status_line_wins_over_header_problems() {
    // The headers alone would report UpgradeRequired; the malformed
    // status line must be rejected before any of them is examined.
    let response = "HTTP/1.1 404 Not Found\r\n\
                    Upgrade: h2c\r\n\
                    \r\n";
    let mut client = client_over(ScriptedTransport::responding_with(response));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();
    assert_eq!(err, Error::BadRequest);
}

#[test]
fn times_out_when_no_bytes_arrive() {
    let mut client = client_over(ScriptedTransport::default());
    let errors = Rc::new(Cell::new(0u32));
    let slot = Rc::clone(&errors);
    client.on_error(move |_| slot.set(slot.get() + 1));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();

    assert_eq!(err, Error::RequestTimeout);
    assert_eq!(client.ready_state(), ReadyState::Closed);
    assert_eq!(errors.get(), 1);
}

#[test]
fn reports_refused_connection() {
    let mut client = client_over(ScriptedTransport::refusing());
    let errors = Rc::new(RefCell::new(Vec::new()));
    let slot = Rc::clone(&errors);
    client.on_error(move |cause| slot.borrow_mut().push(cause));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();

    assert_eq!(err, Error::ConnectionRefused);
    assert_eq!(client.ready_state(), ReadyState::Closed);
    assert_eq!(*errors.borrow(), vec![Error::ConnectionRefused]);
    assert_eq!(client.get_ref().connects, 1);
}

#[test]
fn reopen_force_closes_previous_session() {
    let response = valid_response("");
    let mut client = client_over(ScriptedTransport::responding_with(&response));

    client.open("example.com", 8000, "/chat", None).unwrap();
    assert_eq!(client.get_ref().closes, 0);

    client.get_mut().response = response.bytes().collect();
    client.open("example.com", 8000, "/chat", None).unwrap();

    assert_eq!(client.get_ref().connects, 2);
    assert_eq!(client.get_ref().closes, 1);
    assert_eq!(client.ready_state(), ReadyState::Open);
}

#[test]
fn leaves_body_bytes_unread() {
    let response = format!("{}after-the-headers", valid_response(""));
    let mut client = client_over(ScriptedTransport::responding_with(&response));

    client.open("example.com", 8000, "/chat", None).unwrap();

    assert_eq!(client.get_ref().response.len(), "after-the-headers".len());
    assert_eq!(client.poll(), Poll::Data);
}

#[test]
fn stream_end_before_blank_line_fails_final_check() {
    let response = "HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n";
    let mut client = client_over(ScriptedTransport::responding_with(response));

    let err = client.open("example.com", 8000, "/chat", None).unwrap_err();

    // The connection requirement is the first unsatisfied one.
    assert_eq!(err, Error::UpgradeRequired);
    assert_eq!(client.ready_state(), ReadyState::Closed);
}

#[test]
fn overlong_junk_header_is_truncated_and_skipped() {
    let padding = "a".repeat(300);
    let response = valid_response(&format!("X-Padding: {padding}\r\n"));
    let mut client = client_over(ScriptedTransport::responding_with(&response));

    client.open("example.com", 8000, "/chat", None).unwrap();
    assert_eq!(client.ready_state(), ReadyState::Open);
}

#[test]
fn poll_detects_silent_disconnect_once() {
    let mut client = client_over(ScriptedTransport::responding_with(&valid_response("")));
    let closes = Rc::new(RefCell::new(Vec::new()));
    let slot = Rc::clone(&closes);
    client.on_close(move |code| slot.borrow_mut().push(code));

    client.open("example.com", 8000, "/chat", None).unwrap();
    client.get_mut().connected = false;

    assert_eq!(client.poll(), Poll::Disconnected);
    assert_eq!(client.ready_state(), ReadyState::Closed);
    assert_eq!(client.protocol(), None);

    // Already closed: later polls are quiet.
    assert_eq!(client.poll(), Poll::Idle);
    assert_eq!(*closes.borrow(), vec![CloseCode::Abnormal]);
    assert_eq!(u16::from(CloseCode::Abnormal), 1006);
}
