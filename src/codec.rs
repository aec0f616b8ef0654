//! Base64 handling for subscription and VAPID key material.
//!
//! Browsers and application servers disagree on which base64 flavour to use
//! for `p256dh` and `auth`, so decoding tries every variant in a fixed order
//! and reports which one matched. Encoding always emits unpadded URL-safe
//! base64, the form push services expect for VAPID keys.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};

use crate::types::{Result, WebPushError};

/// A base64 alphabet/padding combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base64Variant {
    /// RFC 4648 §4 alphabet with `=` padding.
    Standard,
    /// RFC 4648 §4 alphabet without padding.
    StandardNoPad,
    /// RFC 4648 §5 (URL-safe) alphabet with `=` padding.
    UrlSafe,
    /// RFC 4648 §5 (URL-safe) alphabet without padding.
    UrlSafeNoPad,
}

/// Decode attempt order: standard first, then URL-safe.
pub const DECODE_ORDER: [Base64Variant; 4] = [
    Base64Variant::Standard,
    Base64Variant::StandardNoPad,
    Base64Variant::UrlSafe,
    Base64Variant::UrlSafeNoPad,
];

impl Base64Variant {
    fn engine(&self) -> &'static base64::engine::GeneralPurpose {
        match self {
            Base64Variant::Standard => &STANDARD,
            Base64Variant::StandardNoPad => &STANDARD_NO_PAD,
            Base64Variant::UrlSafe => &URL_SAFE,
            Base64Variant::UrlSafeNoPad => &URL_SAFE_NO_PAD,
        }
    }

    /// Whether this variant uses the URL-safe alphabet.
    pub fn is_url_safe(&self) -> bool {
        matches!(self, Base64Variant::UrlSafe | Base64Variant::UrlSafeNoPad)
    }
}

/// Bytes recovered from base64 text, tagged with the variant that parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Decoded bytes.
    pub bytes: Vec<u8>,
    /// The variant that accepted the input.
    pub variant: Base64Variant,
}

/// Decode base64 text, trying each variant in [`DECODE_ORDER`].
pub fn decode_tagged(text: &str) -> Result<DecodedKey> {
    let trimmed = text.trim();

    DECODE_ORDER
        .iter()
        .find_map(|variant| {
            variant
                .engine()
                .decode(trimmed)
                .ok()
                .map(|bytes| DecodedKey {
                    bytes,
                    variant: *variant,
                })
        })
        .ok_or_else(|| {
            WebPushError::Decode(format!(
                "not valid standard or URL-safe base64 ({} chars)",
                trimmed.len()
            ))
        })
}

/// Decode base64 text in any accepted variant.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    decode_tagged(text).map(|decoded| decoded.bytes)
}

/// Encode bytes as unpadded URL-safe base64.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encode bytes in a specific variant.
pub fn encode_as(bytes: &[u8], variant: Base64Variant) -> String {
    variant.engine().encode(bytes)
}
