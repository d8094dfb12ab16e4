//! Error handling.

use std::result;

use thiserror::Error;

/// Result type of all handshake calls.
pub type Result<T> = result::Result<T, Error>;

/// Terminal causes of a failed handshake attempt.
///
/// Every failure tears down the transport and forces the session back to
/// [`ReadyState::Closed`](crate::ReadyState::Closed) before the cause is
/// reported; nothing is retried automatically. Finer-grained diagnostics
/// (which header was malformed, what the server actually sent) go to the
/// `log` output at debug level.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transport could not establish a connection to the server.
    #[error("Connection refused")]
    ConnectionRefused,
    /// No response bytes arrived within the wait budget.
    #[error("Handshake response timed out")]
    RequestTimeout,
    /// The `Upgrade` or `Connection` header was missing or carried the
    /// wrong value.
    #[error("Upgrade required")]
    UpgradeRequired,
    /// The status line was not `HTTP/1.1 101`, or `Sec-WebSocket-Accept`
    /// was missing or did not match the expected key.
    #[error("Bad request")]
    BadRequest,
}
