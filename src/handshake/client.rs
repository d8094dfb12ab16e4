//! Client side of the opening handshake: request emission, the bounded
//! wait for the reply, and byte-at-a-time response validation.

use std::{fmt::Write as _, str, thread};

use log::*;

use crate::{
    client::ClientConfig,
    error::{Error, Result},
    transport::Transport,
    LineBuffer,
};

/// Write the upgrade request onto the transport, one CRLF-terminated line
/// at a time, and flush it.
///
/// Lines are formatted into the shared fixed-capacity buffer; anything
/// past its capacity is truncated. Write failures are the transport's
/// responsibility.
//
// [1] GET /chat HTTP/1.1
// [2] Host: example.com:8000
// [3] Upgrade: websocket
// [4] Connection: Upgrade
// [5] Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
// [6] Sec-WebSocket-Version: 13
// [7]
pub(crate) fn write_request<T: Transport>(
    transport: &mut T,
    host: &str,
    port: u16,
    path: &str,
    key: &str,
    protocols: Option<&str>,
) {
    let mut line = LineBuffer::new();

    let _ = write!(line, "GET {path} HTTP/1.1");
    send_line(transport, &mut line);

    let _ = write!(line, "Host: {host}:{port}");
    send_line(transport, &mut line);

    transport.write_line(b"Upgrade: websocket");
    transport.write_line(b"Connection: Upgrade");

    let _ = write!(line, "Sec-WebSocket-Key: {key}");
    send_line(transport, &mut line);

    if let Some(protocols) = protocols {
        let _ = write!(line, "Sec-WebSocket-Protocol: {protocols}");
        send_line(transport, &mut line);
    }

    transport.write_line(b"Sec-WebSocket-Version: 13");
    transport.write_line(b"");

    transport.flush();
}

fn send_line<T: Transport>(transport: &mut T, line: &mut LineBuffer) {
    if line.is_truncated() {
        debug!("request line truncated to {} bytes", line.len());
    }
    transport.write_line(line.as_slice());
    line.clear();
}

/// Poll the transport until the first response byte shows up.
///
/// Returns `false` once the attempt budget is exhausted. The real-time
/// duration is attempts times interval plus scheduling slack, a soft
/// timeout rather than a hardware deadline.
pub(crate) fn wait_for_data<T: Transport>(transport: &mut T, config: &ClientConfig) -> bool {
    let mut attempts = 0;
    while transport.available() == 0 {
        attempts += 1;
        if attempts >= config.response_wait_attempts {
            return false;
        }
        thread::sleep(config.response_wait_interval);
    }
    true
}

/// Consume the response one byte at a time, feeding each completed line
/// to the validator.
///
/// Stops at the blank line that ends the header section, leaving any body
/// bytes on the transport. If the stream runs dry first, parsing simply
/// ends with whatever requirements have been satisfied so far; the final
/// check in [`ResponseValidator::finish`] reports the damage.
pub(crate) fn read_response<T: Transport>(
    transport: &mut T,
    validator: &mut ResponseValidator,
) -> Result<()> {
    let mut line = LineBuffer::new();
    while let Some(byte) = transport.read_byte() {
        if byte != b'\n' {
            line.push(byte);
            continue;
        }
        let content = line.as_slice();
        let content = content.strip_suffix(b"\r").unwrap_or(content);
        match validator.validate_line(content)? {
            HeaderProgress::Continue => line.clear(),
            HeaderProgress::EndOfHeaders => break,
        }
    }
    Ok(())
}

/// What the validator made of one header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderProgress {
    /// Keep feeding lines.
    Continue,
    /// Blank line seen, the header section is over.
    EndOfHeaders,
}

/// The three requirements a server reply has to satisfy.
///
/// Each flag is set at most once; a later duplicate header cannot unset
/// an already satisfied requirement. The set is only read after the
/// header loop ends.
#[derive(Debug, Default, Clone, Copy)]
struct RequirementFlags {
    upgrade: bool,
    connection: bool,
    accept: bool,
}

/// Validates the server reply line by line against RFC 6455, section 4.1.
//
// [1] HTTP/1.1 101 Switching Protocols
// [2] Upgrade: websocket
// [3] Connection: Upgrade
// [4] Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
// [5]
#[derive(Debug)]
pub(crate) struct ResponseValidator {
    expected_accept: String,
    flags: RequirementFlags,
    protocol: Option<String>,
    line: usize,
}

impl ResponseValidator {
    /// `expected_accept` must be derived from the key actually sent in
    /// the request, never from a stale one.
    pub(crate) fn new(expected_accept: String) -> Self {
        ResponseValidator {
            expected_accept,
            flags: RequirementFlags::default(),
            protocol: None,
            line: 0,
        }
    }

    /// Check one header line, `raw` stripped of its line ending.
    pub(crate) fn validate_line(&mut self, raw: &[u8]) -> Result<HeaderProgress> {
        let index = self.line;
        self.line += 1;

        // The status line must announce the protocol switch; nothing else
        // in the reply is worth looking at otherwise.
        if index == 0 {
            if !raw.starts_with(b"HTTP/1.1 101") {
                debug!("unexpected status line: {}", String::from_utf8_lossy(raw));
                return Err(Error::BadRequest);
            }
            return Ok(HeaderProgress::Continue);
        }

        if raw.is_empty() {
            return Ok(HeaderProgress::EndOfHeaders);
        }

        // Tolerant parsing: lines that are not well-formed UTF-8 headers
        // are skipped; the final flag check catches anything that matters.
        let Ok(text) = str::from_utf8(raw) else {
            return Ok(HeaderProgress::Continue);
        };
        let Some((name, rest)) = text.split_once(':') else {
            return Ok(HeaderProgress::Continue);
        };
        let value = rest.split_whitespace().next();

        if name.eq_ignore_ascii_case("Upgrade") {
            // ... a value that is not an ASCII case-insensitive match for
            // "websocket" MUST _Fail the WebSocket Connection_. (RFC 6455)
            if !value.is_some_and(|v| v.eq_ignore_ascii_case("websocket")) {
                debug!("'Upgrade' header value is not 'websocket': {rest:?}");
                return Err(Error::UpgradeRequired);
            }
            self.flags.upgrade = true;
        } else if name.eq_ignore_ascii_case("Connection") {
            // ... doesn't contain a token that is an ASCII case-insensitive
            // match for "Upgrade" MUST _Fail the WebSocket Connection_.
            if !value.is_some_and(|v| v.eq_ignore_ascii_case("Upgrade")) {
                debug!("'Connection' header value is not 'Upgrade': {rest:?}");
                return Err(Error::UpgradeRequired);
            }
            self.flags.connection = true;
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Accept") {
            // The accept value is compared verbatim, case-sensitively.
            if value != Some(self.expected_accept.as_str()) {
                debug!("incorrect 'Sec-WebSocket-Accept' header value");
                return Err(Error::BadRequest);
            }
            self.flags.accept = true;
        } else if name.eq_ignore_ascii_case("Sec-WebSocket-Protocol") {
            if let Some(value) = value {
                self.protocol = Some(value.to_owned());
            }
        }
        // don't care about other headers

        Ok(HeaderProgress::Continue)
    }

    /// Final check once the header loop is over: all three requirements
    /// must be satisfied, examined in a fixed order so the first missing
    /// one determines the reported cause. On success yields the
    /// negotiated subprotocol, if the server picked one.
    pub(crate) fn finish(self) -> Result<Option<String>> {
        if !self.flags.upgrade {
            debug!("'Upgrade' header is missing");
            return Err(Error::UpgradeRequired);
        }
        if !self.flags.connection {
            debug!("'Connection' header is missing");
            return Err(Error::UpgradeRequired);
        }
        if !self.flags.accept {
            debug!("'Sec-WebSocket-Accept' header is missing");
            return Err(Error::BadRequest);
        }
        Ok(self.protocol)
    }
}
