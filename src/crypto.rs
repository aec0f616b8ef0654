//! Encryption and decryption of Web Push message payloads.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::derivation::{derive_keys, DerivedKeys, KeyMaterial};
use crate::envelope::EncryptedMessage;
use crate::keys::{
    derive_shared_secret, generate_ephemeral_keypair, parse_public_key, EphemeralKeyPair,
};
use crate::subscription::SubscriptionKey;
use crate::types::{
    ContentEncoding, Result, WebPushError, AUTH_SECRET_SIZE, DEFAULT_RECORD_SIZE, HEADER_SIZE,
    LAST_RECORD_DELIMITER, MAX_BODY_SIZE, MIN_RECORD_SIZE, SALT_SIZE, TAG_SIZE,
};

/// Length prefix of the legacy `aesgcm` padding field.
const LEGACY_PAD_PREFIX: usize = 2;

/// Configuration for payload encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Content coding to produce.
    pub encoding: ContentEncoding,
    /// Zero bytes of padding added to hide the plaintext length.
    pub padding: usize,
    /// Record size advertised in the `aes128gcm` header.
    pub record_size: u32,
    /// Largest body (header + ciphertext) to produce.
    pub max_body_size: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            encoding: ContentEncoding::Aes128Gcm,
            padding: 0,
            record_size: DEFAULT_RECORD_SIZE,
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

impl EncryptionConfig {
    /// Creates a configuration for the given content coding.
    pub fn new(encoding: ContentEncoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    /// Creates a configuration for the legacy `aesgcm` coding.
    pub fn legacy() -> Self {
        Self::new(ContentEncoding::AesGcm)
    }

    /// Sets the amount of zero padding.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the maximum body size.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Sets the advertised record size.
    pub fn with_record_size(mut self, record_size: u32) -> Self {
        self.record_size = record_size;
        self
    }

    /// Body size produced for a plaintext of `plaintext_len` bytes.
    ///
    /// Saturates at `usize::MAX`.
    pub fn body_size(&self, plaintext_len: usize) -> usize {
        let overhead = match self.encoding {
            ContentEncoding::Aes128Gcm => HEADER_SIZE + 1 + TAG_SIZE,
            ContentEncoding::AesGcm => LEGACY_PAD_PREFIX + TAG_SIZE,
        };
        overhead
            .saturating_add(plaintext_len)
            .saturating_add(self.padding)
    }

    /// Size of the single `aes128gcm` record for `plaintext_len` bytes.
    fn record_len(&self, plaintext_len: usize) -> usize {
        (1 + TAG_SIZE)
            .saturating_add(plaintext_len)
            .saturating_add(self.padding)
    }

    /// Largest plaintext that fits within `max_body_size`.
    pub fn max_plaintext_size(&self) -> usize {
        let overhead = self.body_size(0);
        let by_body = self.max_body_size.saturating_sub(overhead);
        match self.encoding {
            ContentEncoding::Aes128Gcm => {
                let by_record = (self.record_size as usize).saturating_sub(self.record_len(0));
                by_body.min(by_record)
            }
            ContentEncoding::AesGcm => by_body,
        }
    }
}

/// Frame a plaintext for sealing.
///
/// - `aes128gcm`: plaintext || 0x02 || zero padding
/// - `aesgcm`: padding length (u16, big-endian) || zero padding || plaintext
pub fn pad_plaintext(
    plaintext: &[u8],
    padding: usize,
    encoding: ContentEncoding,
) -> Result<Zeroizing<Vec<u8>>> {
    let framed_len = plaintext
        .len()
        .checked_add(padding)
        .and_then(|len| len.checked_add(LEGACY_PAD_PREFIX))
        .ok_or_else(|| {
            WebPushError::Encryption(format!("Padding too large: {} bytes", padding))
        })?;
    let mut framed = Zeroizing::new(Vec::with_capacity(framed_len));

    match encoding {
        ContentEncoding::Aes128Gcm => {
            framed.extend_from_slice(plaintext);
            framed.push(LAST_RECORD_DELIMITER);
            framed.resize(plaintext.len() + 1 + padding, 0);
        }
        ContentEncoding::AesGcm => {
            let pad_len = u16::try_from(padding).map_err(|_| {
                WebPushError::Encryption(format!(
                    "Padding too large: {} bytes (max {})",
                    padding,
                    u16::MAX
                ))
            })?;
            framed.extend_from_slice(&pad_len.to_be_bytes());
            framed.resize(LEGACY_PAD_PREFIX + padding, 0);
            framed.extend_from_slice(plaintext);
        }
    }

    Ok(framed)
}

/// Frame and seal a plaintext with already-derived keys.
///
/// # Returns
/// The AES-128-GCM ciphertext with the 16-byte tag appended
pub fn encrypt(plaintext: &[u8], keys: &DerivedKeys, config: &EncryptionConfig) -> Result<Vec<u8>> {
    check_size(plaintext.len(), config)?;

    let framed = pad_plaintext(plaintext, config.padding, config.encoding)?;

    let cipher = Aes128Gcm::new_from_slice(&keys.content_encryption_key)
        .map_err(|e| WebPushError::Encryption(format!("Cipher init failed: {}", e)))?;
    let nonce = Nonce::from_slice(&keys.nonce);

    cipher
        .encrypt(nonce, framed.as_slice())
        .map_err(|e| WebPushError::Encryption(format!("Seal failed: {}", e)))
}

fn check_size(plaintext_len: usize, config: &EncryptionConfig) -> Result<()> {
    if config.encoding == ContentEncoding::Aes128Gcm {
        if config.record_size < MIN_RECORD_SIZE {
            return Err(WebPushError::Encryption(format!(
                "Record size {} below minimum {}",
                config.record_size, MIN_RECORD_SIZE
            )));
        }

        let record = config.record_len(plaintext_len);
        if record > config.record_size as usize {
            return Err(WebPushError::PayloadTooLarge {
                size: record,
                max: config.record_size as usize,
            });
        }
    }

    let body = config.body_size(plaintext_len);
    if body > config.max_body_size {
        return Err(WebPushError::PayloadTooLarge {
            size: body,
            max: config.max_body_size,
        });
    }

    Ok(())
}

/// Encrypt a message for a subscriber.
///
/// A fresh ephemeral key pair and salt are drawn from `rng` for every call.
pub fn encrypt_message<R>(
    plaintext: &[u8],
    subscriber: &SubscriptionKey,
    config: &EncryptionConfig,
    rng: &mut R,
) -> Result<EncryptedMessage>
where
    R: RngCore + CryptoRng,
{
    // Reject oversized payloads before drawing any randomness
    check_size(plaintext.len(), config)?;

    let ephemeral = generate_ephemeral_keypair(rng)?;

    let mut salt = [0u8; SALT_SIZE];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| WebPushError::KeyGeneration(format!("Salt generation failed: {}", e)))?;

    encrypt_message_with(plaintext, subscriber, config, &ephemeral, salt)
}

/// Encrypt a message with a caller-supplied ephemeral key pair and salt.
///
/// Never reuse either value across messages.
pub fn encrypt_message_with(
    plaintext: &[u8],
    subscriber: &SubscriptionKey,
    config: &EncryptionConfig,
    ephemeral: &EphemeralKeyPair,
    salt: [u8; SALT_SIZE],
) -> Result<EncryptedMessage> {
    let as_public = ephemeral.public_bytes();
    let shared_secret = derive_shared_secret(ephemeral.secret(), subscriber.public_key());

    let keys = derive_keys(
        config.encoding,
        &KeyMaterial {
            shared_secret: &shared_secret[..],
            auth_secret: subscriber.auth(),
            salt: &salt,
            ua_public: subscriber.p256dh(),
            as_public: &as_public,
        },
    )?;

    let ciphertext = encrypt(plaintext, &keys, config)?;

    tracing::debug!(
        encoding = %config.encoding,
        plaintext_len = plaintext.len(),
        ciphertext_len = ciphertext.len(),
        "sealed push payload"
    );

    Ok(EncryptedMessage {
        encoding: config.encoding,
        salt,
        ephemeral_public_key: as_public,
        record_size: config.record_size,
        ciphertext,
    })
}

/// Decrypt a message with the subscriber's private key.
///
/// For `aesgcm` messages the caller fills `salt` and `ephemeral_public_key`
/// from the `Encryption` and `Crypto-Key` headers.
pub fn decrypt_message(
    message: &EncryptedMessage,
    subscriber: &EphemeralKeyPair,
    auth_secret: &[u8; AUTH_SECRET_SIZE],
) -> Result<Vec<u8>> {
    if message.ciphertext.len() < TAG_SIZE {
        return Err(WebPushError::Decryption(format!(
            "Ciphertext too short: {} bytes",
            message.ciphertext.len()
        )));
    }

    let sender_public = parse_public_key(&message.ephemeral_public_key)?;
    let shared_secret = derive_shared_secret(subscriber.secret(), &sender_public);
    let ua_public = subscriber.public_bytes();

    let keys = derive_keys(
        message.encoding,
        &KeyMaterial {
            shared_secret: &shared_secret[..],
            auth_secret,
            salt: &message.salt,
            ua_public: &ua_public,
            as_public: &message.ephemeral_public_key,
        },
    )?;

    let cipher = Aes128Gcm::new_from_slice(&keys.content_encryption_key)
        .map_err(|e| WebPushError::Decryption(format!("Cipher init failed: {}", e)))?;
    let nonce = Nonce::from_slice(&keys.nonce);

    let framed = Zeroizing::new(
        cipher
            .decrypt(nonce, message.ciphertext.as_slice())
            .map_err(|e| WebPushError::Decryption(format!("Open failed: {}", e)))?,
    );

    unpad_plaintext(&framed, message.encoding)
}

/// Decrypt a complete `aes128gcm` body.
pub fn decrypt_body(
    body: &[u8],
    subscriber: &EphemeralKeyPair,
    auth_secret: &[u8; AUTH_SECRET_SIZE],
) -> Result<Vec<u8>> {
    let message = EncryptedMessage::decode(body)?;
    decrypt_message(&message, subscriber, auth_secret)
}

fn unpad_plaintext(framed: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Aes128Gcm => {
            let end = framed
                .iter()
                .rposition(|&b| b != 0)
                .ok_or_else(|| WebPushError::Decryption("Record has no padding delimiter".into()))?;

            if framed[end] != LAST_RECORD_DELIMITER {
                return Err(WebPushError::Decryption(format!(
                    "Expected final record delimiter 0x02, got 0x{:02x}",
                    framed[end]
                )));
            }

            Ok(framed[..end].to_vec())
        }
        ContentEncoding::AesGcm => {
            if framed.len() < LEGACY_PAD_PREFIX {
                return Err(WebPushError::Decryption("Record shorter than padding prefix".into()));
            }

            let pad_len = u16::from_be_bytes([framed[0], framed[1]]) as usize;
            let start = LEGACY_PAD_PREFIX + pad_len;

            if framed.len() < start {
                return Err(WebPushError::Decryption(format!(
                    "Padding length {} exceeds record",
                    pad_len
                )));
            }

            if framed[LEGACY_PAD_PREFIX..start].iter().any(|&b| b != 0) {
                return Err(WebPushError::Decryption("Padding is not zero".into()));
            }

            Ok(framed[start..].to_vec())
        }
    }
}
