//! P-256 key generation and ECDH key agreement.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::types::{
    Result, WebPushError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE, SHARED_SECRET_SIZE,
};

/// Attempts at drawing a scalar below the curve order before giving up.
const MAX_SCALAR_ATTEMPTS: usize = 16;

/// A single-use P-256 key pair for one message.
///
/// The secret scalar is zeroized when the pair is dropped.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// The private scalar.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// The public point.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The public point in uncompressed SEC1 form (65 bytes).
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        encode_public_key(&self.public)
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &crate::codec::encode(&self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// Generate a random P-256 key pair from a cryptographically secure source.
///
/// Fails with [`WebPushError::KeyGeneration`] if the source reports an error.
pub fn generate_ephemeral_keypair<R>(rng: &mut R) -> Result<EphemeralKeyPair>
where
    R: RngCore + CryptoRng,
{
    let secret = random_secret_key(rng)?;
    let public = secret.public_key();
    Ok(EphemeralKeyPair { secret, public })
}

/// Draw a P-256 secret scalar, redrawing candidates outside the curve order.
pub(crate) fn random_secret_key<R>(rng: &mut R) -> Result<SecretKey>
where
    R: RngCore + CryptoRng,
{
    let mut candidate = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);

    for _ in 0..MAX_SCALAR_ATTEMPTS {
        rng.try_fill_bytes(&mut candidate[..])
            .map_err(|e| WebPushError::KeyGeneration(format!("Random source failed: {}", e)))?;

        if let Ok(secret) = SecretKey::from_slice(&candidate[..]) {
            return Ok(secret);
        }
    }

    Err(WebPushError::KeyGeneration(
        "Random source did not yield a valid P-256 scalar".into(),
    ))
}

/// Rebuild a key pair from a raw 32-byte private scalar.
pub fn keypair_from_bytes(secret: &[u8]) -> Result<EphemeralKeyPair> {
    if secret.len() != PRIVATE_KEY_SIZE {
        return Err(WebPushError::InvalidKey(format!(
            "Private key must be {} bytes, got {}",
            PRIVATE_KEY_SIZE,
            secret.len()
        )));
    }

    let secret = SecretKey::from_slice(secret)
        .map_err(|_| WebPushError::InvalidKey("Private key is not a valid P-256 scalar".into()))?;
    let public = secret.public_key();
    Ok(EphemeralKeyPair { secret, public })
}

/// Parse and validate an uncompressed P-256 public key.
///
/// The key must be exactly 65 bytes, start with `0x04`, and lie on the
/// curve. The point at infinity is rejected.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(WebPushError::InvalidKey(format!(
            "Public key must be {} bytes, got {}",
            PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }

    if bytes[0] != 0x04 {
        return Err(WebPushError::InvalidKey(format!(
            "Public key must be an uncompressed point (0x04 prefix), got 0x{:02x}",
            bytes[0]
        )));
    }

    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| WebPushError::InvalidKey("Public key is not a point on P-256".into()))
}

/// Encode a public key as an uncompressed SEC1 point.
pub fn encode_public_key(public: &PublicKey) -> [u8; PUBLIC_KEY_SIZE] {
    let point = public.to_encoded_point(false);
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(point.as_bytes());
    out
}

/// Perform P-256 ECDH.
///
/// # Returns
/// The 32-byte x-coordinate of the shared point
pub fn derive_shared_secret(
    secret: &SecretKey,
    public: &PublicKey,
) -> Zeroizing<[u8; SHARED_SECRET_SIZE]> {
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let mut out = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    out
}
