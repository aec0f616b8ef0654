//! Type definitions and protocol constants for Web Push encryption.

use std::fmt;

use thiserror::Error;

/// Size of the per-message salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Size of the subscription authentication secret in bytes.
pub const AUTH_SECRET_SIZE: usize = 16;

/// Size of an uncompressed P-256 public key (0x04 || x || y).
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Size of a raw P-256 private scalar.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of the ECDH shared secret (the x-coordinate).
pub const SHARED_SECRET_SIZE: usize = 32;

/// Size of the AES-128-GCM content encryption key.
pub const CEK_SIZE: usize = 16;

/// Size of the AES-GCM nonce.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Size of the `aes128gcm` header: salt(16) + rs(4) + idlen(1) + keyid(65).
pub const HEADER_SIZE: usize = SALT_SIZE + 4 + 1 + PUBLIC_KEY_SIZE;

/// Default record size advertised in the `aes128gcm` header.
pub const DEFAULT_RECORD_SIZE: u32 = 4096;

/// Smallest `aes128gcm` record size (RFC 8188 requires more than 17).
pub const MIN_RECORD_SIZE: u32 = 18;

/// Largest encrypted body push services are required to accept.
pub const MAX_BODY_SIZE: usize = 4096;

/// Padding delimiter marking the final (and only) `aes128gcm` record.
pub const LAST_RECORD_DELIMITER: u8 = 0x02;

/// Longest VAPID token lifetime push services accept (24 hours).
pub const MAX_VAPID_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Default VAPID token lifetime (12 hours).
pub const DEFAULT_VAPID_EXPIRY_SECS: u64 = 12 * 60 * 60;

/// HKDF info for the RFC 8291 key combination step.
pub const WEBPUSH_INFO_PREFIX: &[u8] = b"WebPush: info\0";

/// HKDF info for the `aes128gcm` content encryption key.
pub const AES128GCM_CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";

/// HKDF info for the nonce (both encodings, legacy appends a context).
pub const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// HKDF info for the legacy `aesgcm` auth secret step.
pub const LEGACY_AUTH_INFO: &[u8] = b"Content-Encoding: auth\0";

/// HKDF info prefix for the legacy `aesgcm` content encryption key.
pub const LEGACY_CEK_INFO: &[u8] = b"Content-Encoding: aesgcm\0";

/// Curve label opening the legacy `aesgcm` key context.
pub const LEGACY_CONTEXT_LABEL: &[u8] = b"P-256\0";

/// Content coding applied to a push message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentEncoding {
    /// RFC 8291 / RFC 8188 encoding, understood by every current browser.
    #[default]
    Aes128Gcm,
    /// Pre-standard draft encoding still accepted by some push services.
    AesGcm,
}

impl ContentEncoding {
    /// Value of the `Content-Encoding` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Aes128Gcm => "aes128gcm",
            ContentEncoding::AesGcm => "aesgcm",
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while preparing a push message.
#[derive(Error, Debug)]
pub enum WebPushError {
    /// Text was not valid base64 in any accepted variant.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Key material has the wrong length or is not a valid curve point.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The random source could not produce key material.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// VAPID token could not be produced.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Encrypted body would exceed what push services accept.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Request inputs are structurally inconsistent.
    #[error("Request assembly failed: {0}")]
    Assembly(String),

    /// Key derivation or sealing failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Ciphertext could not be opened or its padding is malformed.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A batch worker task died before reporting a result.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

/// Result type for webpush operations.
pub type Result<T> = std::result::Result<T, WebPushError>;
