//! WebSocket opening handshake (RFC 6455, section 4).

pub mod client;

use data_encoding::BASE64;
use sha1::{Digest, Sha1};

/// Turn a `Sec-WebSocket-Key` into the `Sec-WebSocket-Accept` the server
/// is expected to answer with.
pub fn derive_accept_key(request_key: &[u8]) -> String {
    // ... the value is constructed by concatenating /key/ with the string
    // "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" and taking the base64-encoded
    // SHA-1 of that. (RFC 6455)
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut sha1 = Sha1::default();
    sha1.update(request_key);
    sha1.update(WS_GUID);
    BASE64.encode(&sha1.finalize())
}

/// Source of the 16 random bytes behind a handshake key.
///
/// The key is an anti-cache token, not a security boundary, so a weak
/// source is acceptable by protocol design. It is still kept behind this
/// trait so an application can substitute a stronger one without touching
/// any parsing logic.
pub trait NonceSource {
    /// Produce 16 fresh random bytes.
    fn nonce(&mut self) -> [u8; 16];
}

/// The default nonce source, backed by the `rand` thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngNonce;

impl NonceSource for ThreadRngNonce {
    fn nonce(&mut self) -> [u8; 16] {
        rand::random()
    }
}

/// Generate a key for the `Sec-WebSocket-Key` header.
///
/// A base64-encoded value that, when decoded, is 16 bytes in length
/// (RFC 6455).
pub fn generate_key(source: &mut dyn NonceSource) -> String {
    BASE64.encode(&source.nonce())
}

#[cfg(test)]
mod tests {
    use super::{derive_accept_key, generate_key, ThreadRngNonce};
    use data_encoding::BASE64;

    #[test]
    fn key_conversion() {
        // example from RFC 6455
        assert_eq!(
            derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn random_keys() {
        let mut source = ThreadRngNonce;
        let k1 = generate_key(&mut source);
        let k2 = generate_key(&mut source);
        assert_ne!(k1, k2);
        assert_eq!(k1.len(), 24);
        assert_eq!(k2.len(), 24);
        assert!(k1.ends_with("=="));
        assert!(k2.ends_with("=="));
        assert_eq!(BASE64.decode(k1.as_bytes()).unwrap().len(), 16);
        assert_eq!(BASE64.decode(k2.as_bytes()).unwrap().len(), 16);
    }
}
