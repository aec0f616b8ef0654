//! webpush - Web Push message encryption and VAPID signing
//!
//! Rust implementation of RFC 8291 payload encryption (P-256 ECDH +
//! HKDF-SHA-256 + AES-128-GCM) and RFC 8292 VAPID tokens, producing
//! ready-to-send RFC 8030 push requests.

pub mod codec;

mod types;
mod keys;
mod derivation;
mod envelope;
mod crypto;
mod subscription;
mod vapid;
mod request;
mod sender;

pub use types::*;
pub use keys::*;
pub use derivation::*;
pub use envelope::*;
pub use crypto::*;
pub use subscription::*;
pub use vapid::*;
pub use request::*;
pub use sender::*;
