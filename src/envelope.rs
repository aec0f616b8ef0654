//! Encrypted message container and the `aes128gcm` body format.

use crate::types::{
    ContentEncoding, Result, WebPushError, HEADER_SIZE, MIN_RECORD_SIZE, PUBLIC_KEY_SIZE,
    SALT_SIZE, TAG_SIZE,
};

/// A sealed push message, ready to be placed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Content coding the ciphertext was produced with.
    pub encoding: ContentEncoding,
    /// Per-message salt (16 bytes).
    pub salt: [u8; SALT_SIZE],
    /// Sender's ephemeral public key, uncompressed (65 bytes).
    pub ephemeral_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Record size advertised to the receiver.
    pub record_size: u32,
    /// AES-GCM ciphertext including the 16-byte tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    /// Encode the HTTP body for this message.
    ///
    /// `aes128gcm` carries its parameters in-band (RFC 8188 §2.1):
    /// - [0-15]   salt (16 bytes)
    /// - [16-19]  record size (u32, big-endian)
    /// - [20]     key id length (65)
    /// - [21-85]  ephemeral public key (65 bytes)
    /// - [86+]    ciphertext
    ///
    /// `aesgcm` sends salt and key in headers, so the body is the ciphertext.
    pub fn encode(&self) -> Vec<u8> {
        match self.encoding {
            ContentEncoding::Aes128Gcm => {
                let mut data = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
                data.extend_from_slice(&self.salt);
                data.extend_from_slice(&self.record_size.to_be_bytes());
                data.push(PUBLIC_KEY_SIZE as u8);
                data.extend_from_slice(&self.ephemeral_public_key);
                data.extend_from_slice(&self.ciphertext);
                data
            }
            ContentEncoding::AesGcm => self.ciphertext.clone(),
        }
    }

    /// Size of the encoded body in bytes.
    pub fn body_len(&self) -> usize {
        match self.encoding {
            ContentEncoding::Aes128Gcm => HEADER_SIZE + self.ciphertext.len(),
            ContentEncoding::AesGcm => self.ciphertext.len(),
        }
    }

    /// Decode an `aes128gcm` body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + TAG_SIZE {
            return Err(WebPushError::Decryption(format!(
                "Body too short: {} bytes (minimum {})",
                data.len(),
                HEADER_SIZE + TAG_SIZE
            )));
        }

        let mut offset = 0;

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&data[offset..offset + SALT_SIZE]);
        offset += SALT_SIZE;

        let record_size = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        offset += 4;

        if record_size < MIN_RECORD_SIZE {
            return Err(WebPushError::Decryption(format!(
                "Record size {} below minimum {}",
                record_size, MIN_RECORD_SIZE
            )));
        }

        let id_len = data[offset] as usize;
        offset += 1;

        if id_len != PUBLIC_KEY_SIZE {
            return Err(WebPushError::Decryption(format!(
                "Key id must be a {}-byte public key, got {} bytes",
                PUBLIC_KEY_SIZE, id_len
            )));
        }

        let mut ephemeral_public_key = [0u8; PUBLIC_KEY_SIZE];
        ephemeral_public_key.copy_from_slice(&data[offset..offset + PUBLIC_KEY_SIZE]);
        offset += PUBLIC_KEY_SIZE;

        let ciphertext = data[offset..].to_vec();

        if ciphertext.len() > record_size as usize {
            return Err(WebPushError::Decryption(format!(
                "Body holds more than one record ({} bytes, record size {})",
                ciphertext.len(),
                record_size
            )));
        }

        Ok(Self {
            encoding: ContentEncoding::Aes128Gcm,
            salt,
            ephemeral_public_key,
            record_size,
            ciphertext,
        })
    }
}

/// Check if data looks like an `aes128gcm` body carrying a P-256 key id.
pub fn is_aes128gcm_body(data: &[u8]) -> bool {
    if data.len() < HEADER_SIZE + TAG_SIZE {
        return false;
    }
    data[SALT_SIZE + 4] as usize == PUBLIC_KEY_SIZE && data[SALT_SIZE + 5] == 0x04
}
