//! Client-side WebSocket opening handshake over pluggable byte transports.
//!
//! This crate implements the HTTP upgrade exchange of RFC 6455, section 4,
//! from the client side: it generates the handshake key, emits the upgrade
//! request and incrementally parses the server reply one byte at a time,
//! within a fixed memory budget and a bounded wait. Frame encoding, TLS and
//! the byte stream itself are left to collaborators; anything implementing
//! [`Transport`] will do.
#![deny(
    missing_docs,
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod buffer;
pub mod client;
pub mod error;
pub mod handshake;
pub mod transport;

const HANDSHAKE_LINE_SIZE: usize = 128;
type LineBuffer = buffer::LineBuffer<HANDSHAKE_LINE_SIZE>;

pub use crate::{
    client::{ClientConfig, CloseCode, Poll, ReadyState, WebSocketClient},
    error::{Error, Result},
    handshake::{derive_accept_key, generate_key, NonceSource, ThreadRngNonce},
    transport::{TcpTransport, Transport},
};
