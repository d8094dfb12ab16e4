//! The byte-stream capability the handshake runs over, and a blocking
//! TCP implementation of it.

use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, TcpStream},
    time::Duration,
};

use log::*;

/// A connection-oriented byte stream.
///
/// The handshake only ever consumes one byte at a time and writes whole
/// lines, so the trait is deliberately small. Implementations do not
/// return errors: write failures are logged and surface later as a dead
/// connection, the way [`connected`](Transport::connected) reports it.
pub trait Transport {
    /// Establish a connection, tearing down any previous one first.
    /// Returns `false` when the peer cannot be reached.
    fn connect(&mut self, host: &str, port: u16) -> bool;

    /// Whether the transport still has a live connection.
    fn connected(&self) -> bool;

    /// How many bytes can be read right now without blocking. May
    /// under-report; zero means none.
    fn available(&mut self) -> usize;

    /// The next byte, or `None` once the stream has nothing more to
    /// offer for this read pass.
    fn read_byte(&mut self) -> Option<u8>;

    /// Write `line` followed by CRLF.
    fn write_line(&mut self, line: &[u8]);

    /// Push any buffered output to the peer.
    fn flush(&mut self);

    /// Tear the connection down. A no-op when not connected.
    fn close(&mut self);
}

/// Blocking [`Transport`] over [`std::net::TcpStream`].
///
/// Reads block for at most the configured timeout per byte, so a stalled
/// server ends a read pass instead of hanging the caller forever.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_timeout: Duration,
}

impl TcpTransport {
    const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Create a disconnected transport with the default read timeout.
    pub fn new() -> Self {
        Self::with_read_timeout(Self::DEFAULT_READ_TIMEOUT)
    }

    /// Create a disconnected transport with the given per-byte read
    /// timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        TcpTransport { stream: None, read_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> bool {
        self.close();
        match TcpStream::connect((host, port)) {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    debug!("failed to set TCP_NODELAY: {err}");
                }
                if let Err(err) = stream.set_read_timeout(Some(self.read_timeout)) {
                    debug!("failed to set read timeout: {err}");
                }
                self.stream = Some(stream);
                true
            }
            Err(err) => {
                debug!("connecting to {host}:{port} failed: {err}");
                false
            }
        }
    }

    fn connected(&self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        if stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut probe = [0u8; 1];
        let alive = match stream.peek(&mut probe) {
            // Zero bytes from peek means the peer performed an orderly
            // shutdown; pending data or WouldBlock means the stream lives.
            Ok(0) => false,
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::WouldBlock => true,
            Err(_) => false,
        };
        let _ = stream.set_nonblocking(false);
        alive
    }

    fn available(&mut self) -> usize {
        let Some(stream) = &self.stream else {
            return 0;
        };
        if stream.set_nonblocking(true).is_err() {
            return 0;
        }
        let mut peeked = [0u8; 64];
        let count = match stream.peek(&mut peeked) {
            Ok(count) => count,
            Err(_) => 0,
        };
        let _ = stream.set_nonblocking(false);
        count
    }

    fn read_byte(&mut self) -> Option<u8> {
        let stream = self.stream.as_mut()?;
        let mut byte = [0u8; 1];
        loop {
            match stream.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    return None
                }
                Err(err) => {
                    debug!("read failed: {err}");
                    return None;
                }
            }
        }
    }

    fn write_line(&mut self, line: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let result = stream.write_all(line).and_then(|()| stream.write_all(b"\r\n"));
        if let Err(err) = result {
            debug!("write failed: {err}");
        }
    }

    fn flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(err) = stream.flush() {
                debug!("flush failed: {err}");
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
