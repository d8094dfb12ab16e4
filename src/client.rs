//! The handshake orchestrator: session state, callbacks and the blocking
//! `open`/`poll`/`close` surface.

use std::{fmt, time::Duration};

use log::*;

use crate::{
    error::{Error, Result},
    handshake::{
        client::{read_response, wait_for_data, write_request, ResponseValidator},
        derive_accept_key, generate_key, NonceSource, ThreadRngNonce,
    },
    transport::Transport,
};

/// Lifecycle phase of a WebSocket session.
///
/// Transitions are monotonic within one handshake attempt; every failure
/// path forces the state back to `Closed` before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The upgrade request has been sent, the reply is pending.
    Connecting,
    /// The handshake succeeded; frames may be layered on top.
    Open,
    /// The session is being torn down.
    Closing,
    /// No session. The initial state.
    Closed,
}

/// Close status codes from RFC 6455, section 7.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: normal closure.
    Normal,
    /// 1001: endpoint going away.
    Away,
    /// 1006: connection dropped without a closing handshake.
    Abnormal,
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Abnormal => 1006,
        }
    }
}

/// Outcome of a single [`WebSocketClient::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Nothing to do.
    Idle,
    /// Bytes are pending on the transport for a frame layer to read.
    Data,
    /// The transport died while the session was open; the session is now
    /// closed and the close notification has fired.
    Disconnected,
}

/// Tunables for the opening handshake.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How many times to poll for the first response byte before giving
    /// up with [`Error::RequestTimeout`].
    pub response_wait_attempts: u32,
    /// Delay between polls. The soft timeout is attempts times interval.
    pub response_wait_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            response_wait_attempts: 5000,
            response_wait_interval: Duration::from_millis(1),
        }
    }
}

type OpenCallback = Box<dyn FnMut(Option<&str>)>;
type ErrorCallback = Box<dyn FnMut(Error)>;
type CloseCallback = Box<dyn FnMut(CloseCode)>;

/// A single-session WebSocket client performing the opening handshake
/// over a [`Transport`].
///
/// One session at a time: [`open`](Self::open) force-closes any previous
/// session before starting a new attempt. Callbacks are single-slot
/// registrations, last one wins, and run synchronously on the caller's
/// stack during the triggering operation, so they must not block.
pub struct WebSocketClient<T: Transport> {
    transport: T,
    config: ClientConfig,
    nonce: Box<dyn NonceSource>,
    ready_state: ReadyState,
    protocol: Option<String>,
    on_open: Option<OpenCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

impl<T: Transport> WebSocketClient<T> {
    /// Create a client over the given transport with default tunables.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client over the given transport with explicit tunables.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        WebSocketClient {
            transport,
            config,
            nonce: Box::new(ThreadRngNonce),
            ready_state: ReadyState::Closed,
            protocol: None,
            on_open: None,
            on_error: None,
            on_close: None,
        }
    }

    /// Replace the randomness provider behind the handshake key.
    pub fn set_nonce_source(&mut self, source: impl NonceSource + 'static) {
        self.nonce = Box::new(source);
    }

    /// Register the open listener. Replaces any previous one. It receives
    /// the negotiated subprotocol, if the server picked one.
    pub fn on_open(&mut self, callback: impl FnMut(Option<&str>) + 'static) {
        self.on_open = Some(Box::new(callback));
    }

    /// Register the error listener. Replaces any previous one. It fires
    /// exactly once per failed handshake attempt, with the terminal cause.
    pub fn on_error(&mut self, callback: impl FnMut(Error) + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    /// Register the close listener. Replaces any previous one. Fired by
    /// [`poll`](Self::poll) when an open session dies under us.
    pub fn on_close(&mut self, callback: impl FnMut(CloseCode) + 'static) {
        self.on_close = Some(Box::new(callback));
    }

    /// Current lifecycle phase.
    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// The subprotocol the server selected, while the session is open.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Returns a shared reference to the transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the transport, e.g. for a frame
    /// layer reading on top of an open session.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Perform the opening handshake against `host:port`.
    ///
    /// Any previous session is force-closed first. On success the state
    /// becomes [`ReadyState::Open`] and the open listener fires; on
    /// failure the transport is torn down, the state is forced back to
    /// [`ReadyState::Closed`], the error listener fires once with the
    /// cause, and that cause is returned. Nothing is retried.
    pub fn open(
        &mut self,
        host: &str,
        port: u16,
        path: &str,
        protocols: Option<&str>,
    ) -> Result<()> {
        self.close();

        if !self.transport.connect(host, port) {
            return self.fail(Error::ConnectionRefused);
        }

        let key = generate_key(self.nonce.as_mut());
        write_request(&mut self.transport, host, port, path, &key, protocols);

        self.ready_state = ReadyState::Connecting;
        if !wait_for_data(&mut self.transport, &self.config) {
            debug!("no handshake response within the wait budget");
            return self.fail(Error::RequestTimeout);
        }

        // The expected accept value comes from the key that actually went
        // out on the wire.
        let mut validator = ResponseValidator::new(derive_accept_key(key.as_bytes()));
        let negotiated =
            match read_response(&mut self.transport, &mut validator).and_then(|()| validator.finish()) {
                Ok(negotiated) => negotiated,
                Err(cause) => return self.fail(cause),
            };

        self.protocol = negotiated;
        self.ready_state = ReadyState::Open;
        debug!("client handshake done");
        if let Some(callback) = self.on_open.as_mut() {
            callback(self.protocol.as_deref());
        }
        Ok(())
    }

    /// Check transport liveness and pending data; one unit of work per
    /// call, never blocking. Meant to be driven by the caller's own loop
    /// once the session is open.
    pub fn poll(&mut self) -> Poll {
        if !self.transport.connected() {
            if self.ready_state == ReadyState::Open {
                debug!("transport disconnected while open");
                self.terminate();
                if let Some(callback) = self.on_close.as_mut() {
                    callback(CloseCode::Abnormal);
                }
                return Poll::Disconnected;
            }
            return Poll::Idle;
        }

        if self.transport.available() > 0 {
            Poll::Data
        } else {
            Poll::Idle
        }
    }

    /// Tear down the current session, if any. Idempotent.
    pub fn close(&mut self) {
        if self.ready_state == ReadyState::Closed {
            return;
        }
        self.ready_state = ReadyState::Closing;
        self.terminate();
    }

    fn fail(&mut self, cause: Error) -> Result<()> {
        self.terminate();
        if let Some(callback) = self.on_error.as_mut() {
            callback(cause);
        }
        Err(cause)
    }

    fn terminate(&mut self) {
        self.transport.close();
        self.protocol = None;
        self.ready_state = ReadyState::Closed;
    }
}

impl<T: Transport> fmt::Debug for WebSocketClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("ready_state", &self.ready_state)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}
