//! REST API and WebSocket handlers: the thin HTTP adapter over `core::Registry`.

use base64::Engine;

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod ws;

pub use routes::create_router;

/// Standard base64 (with padding), used to ship raw image/mask/histogram
/// bytes over JSON.
pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::base64_encode;

    #[test]
    fn base64_matches_known_vectors() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"foobar"), "Zm9vYmFy");
    }
}
