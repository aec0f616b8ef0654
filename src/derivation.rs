//! HKDF-SHA-256 key schedule for Web Push message encryption.
//!
//! Both content encodings run two HKDF stages. The first binds the ECDH
//! secret to the subscription's auth secret; the second mixes in the
//! per-message salt and yields the content encryption key and nonce.
//!
//! `aes128gcm` (RFC 8291):
//! - IKM   = HKDF(auth, ecdh, "WebPush: info\0" || ua_public || as_public, 32)
//! - CEK   = HKDF(salt, IKM, "Content-Encoding: aes128gcm\0", 16)
//! - NONCE = HKDF(salt, IKM, "Content-Encoding: nonce\0", 12)
//!
//! `aesgcm` (legacy draft):
//! - IKM     = HKDF(auth, ecdh, "Content-Encoding: auth\0", 32)
//! - context = "P-256\0" || 0x0041 || ua_public || 0x0041 || as_public
//! - CEK     = HKDF(salt, IKM, "Content-Encoding: aesgcm\0" || context, 16)
//! - NONCE   = HKDF(salt, IKM, "Content-Encoding: nonce\0" || context, 12)

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::types::{
    ContentEncoding, Result, WebPushError, AES128GCM_CEK_INFO, AUTH_SECRET_SIZE, CEK_SIZE,
    LEGACY_AUTH_INFO, LEGACY_CEK_INFO, LEGACY_CONTEXT_LABEL, NONCE_INFO, NONCE_SIZE,
    PUBLIC_KEY_SIZE, SALT_SIZE, WEBPUSH_INFO_PREFIX,
};

/// Content encryption key and nonce for one message.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// AES-128-GCM key.
    pub content_encryption_key: [u8; CEK_SIZE],
    /// AES-GCM nonce for the single record.
    pub nonce: [u8; NONCE_SIZE],
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeys([REDACTED])")
    }
}

/// Inputs to the key schedule.
///
/// `ua_public` is the subscriber's key, `as_public` the sender's ephemeral key.
#[derive(Clone, Copy)]
pub struct KeyMaterial<'a> {
    /// ECDH shared secret.
    pub shared_secret: &'a [u8],
    /// Subscription authentication secret.
    pub auth_secret: &'a [u8; AUTH_SECRET_SIZE],
    /// Per-message salt.
    pub salt: &'a [u8; SALT_SIZE],
    /// Subscriber (user agent) public key.
    pub ua_public: &'a [u8; PUBLIC_KEY_SIZE],
    /// Application server ephemeral public key.
    pub as_public: &'a [u8; PUBLIC_KEY_SIZE],
}

/// Derive the content encryption key and nonce for `encoding`.
pub fn derive_keys(encoding: ContentEncoding, material: &KeyMaterial<'_>) -> Result<DerivedKeys> {
    let ikm = combine_secrets(encoding, material)?;

    let (cek_info, nonce_info) = match encoding {
        ContentEncoding::Aes128Gcm => (AES128GCM_CEK_INFO.to_vec(), NONCE_INFO.to_vec()),
        ContentEncoding::AesGcm => {
            let context = legacy_context(material.ua_public, material.as_public);
            (
                [LEGACY_CEK_INFO, context.as_slice()].concat(),
                [NONCE_INFO, context.as_slice()].concat(),
            )
        }
    };

    let hkdf = Hkdf::<Sha256>::new(Some(material.salt), &ikm[..]);

    let mut keys = DerivedKeys {
        content_encryption_key: [0u8; CEK_SIZE],
        nonce: [0u8; NONCE_SIZE],
    };
    hkdf.expand(&cek_info, &mut keys.content_encryption_key)
        .map_err(|e| WebPushError::Encryption(format!("CEK derivation failed: {}", e)))?;
    hkdf.expand(&nonce_info, &mut keys.nonce)
        .map_err(|e| WebPushError::Encryption(format!("Nonce derivation failed: {}", e)))?;

    Ok(keys)
}

/// First stage: bind the ECDH secret to the auth secret.
fn combine_secrets(
    encoding: ContentEncoding,
    material: &KeyMaterial<'_>,
) -> Result<Zeroizing<[u8; 32]>> {
    let info = match encoding {
        ContentEncoding::Aes128Gcm => {
            let mut info = Vec::with_capacity(WEBPUSH_INFO_PREFIX.len() + 2 * PUBLIC_KEY_SIZE);
            info.extend_from_slice(WEBPUSH_INFO_PREFIX);
            info.extend_from_slice(material.ua_public);
            info.extend_from_slice(material.as_public);
            info
        }
        ContentEncoding::AesGcm => LEGACY_AUTH_INFO.to_vec(),
    };

    let hkdf = Hkdf::<Sha256>::new(Some(material.auth_secret), material.shared_secret);
    let mut ikm = Zeroizing::new([0u8; 32]);
    hkdf.expand(&info, &mut ikm[..])
        .map_err(|e| WebPushError::Encryption(format!("IKM derivation failed: {}", e)))?;
    Ok(ikm)
}

/// Legacy `aesgcm` key context: label, then each key prefixed by its u16 length.
fn legacy_context(ua_public: &[u8; PUBLIC_KEY_SIZE], as_public: &[u8; PUBLIC_KEY_SIZE]) -> Vec<u8> {
    let key_len = (PUBLIC_KEY_SIZE as u16).to_be_bytes();

    let mut context = Vec::with_capacity(LEGACY_CONTEXT_LABEL.len() + 2 * (2 + PUBLIC_KEY_SIZE));
    context.extend_from_slice(LEGACY_CONTEXT_LABEL);
    context.extend_from_slice(&key_len);
    context.extend_from_slice(ua_public);
    context.extend_from_slice(&key_len);
    context.extend_from_slice(as_public);
    context
}
