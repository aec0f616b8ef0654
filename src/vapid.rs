//! VAPID application server identification (RFC 8292).
//!
//! A VAPID key pair is a P-256 ECDSA key generated once per deployment and
//! stored by the caller. Each outgoing request carries a short-lived ES256
//! JWT naming the push service origin (`aud`), an expiry (`exp`), and a
//! contact (`sub`), together with the public key so the push service can
//! check the signature.

use std::time::{SystemTime, UNIX_EPOCH};

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::keys::{keypair_from_bytes, random_secret_key};
use crate::subscription::endpoint_origin;
use crate::types::{
    ContentEncoding, Result, WebPushError, DEFAULT_VAPID_EXPIRY_SECS, MAX_VAPID_EXPIRY_SECS,
    PUBLIC_KEY_SIZE,
};

/// Size of an ES256 signature (r || s).
pub const ES256_SIGNATURE_SIZE: usize = 64;

/// VAPID signing key pair.
#[derive(Clone)]
pub struct VapidKeyPair {
    signing_key: SigningKey,
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl VapidKeyPair {
    /// Generate a fresh key pair from a cryptographically secure source.
    pub fn generate<R>(rng: &mut R) -> Result<Self>
    where
        R: RngCore + CryptoRng,
    {
        let secret = random_secret_key(rng)?;
        Self::from_bytes(&secret.to_bytes())
    }

    /// Rebuild from a raw 32-byte private scalar.
    pub fn from_bytes(private_key: &[u8]) -> Result<Self> {
        let pair = keypair_from_bytes(private_key)?;
        let signing_key = SigningKey::from_bytes(&pair.secret().to_bytes()).map_err(|_| {
            WebPushError::InvalidKey("VAPID private key is not a valid P-256 scalar".into())
        })?;

        Ok(Self {
            signing_key,
            public_key: pair.public_bytes(),
        })
    }

    /// Rebuild from a base64 private scalar.
    pub fn from_base64url(private_key_b64: &str) -> Result<Self> {
        let private_key = zeroize::Zeroizing::new(codec::decode(private_key_b64)?);
        Self::from_bytes(&private_key)
    }

    /// Rebuild from a stored (public, private) pair, checking they belong together.
    pub fn from_base64url_pair(public_key_b64: &str, private_key_b64: &str) -> Result<Self> {
        let keys = Self::from_base64url(private_key_b64)?;
        let public_key = codec::decode(public_key_b64)?;

        if public_key.as_slice() != keys.public_key.as_slice() {
            return Err(WebPushError::InvalidKey(
                "VAPID public key does not match the private key".into(),
            ));
        }

        Ok(keys)
    }

    /// Unpadded URL-safe base64 of the raw 32-byte private scalar.
    pub fn private_key_base64url(&self) -> String {
        let bytes = self.signing_key.to_bytes();
        codec::encode(bytes.as_slice())
    }

    /// Unpadded URL-safe base64 of the uncompressed public key.
    ///
    /// This is the `applicationServerKey` browsers subscribe with.
    pub fn public_key_base64url(&self) -> String {
        codec::encode(&self.public_key)
    }

    /// Uncompressed public key bytes (65 bytes).
    pub fn public_key_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }
}

impl std::fmt::Debug for VapidKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeyPair")
            .field("public_key", &self.public_key_base64url())
            .finish_non_exhaustive()
    }
}

/// Generate a VAPID key pair.
pub fn generate_keypair<R>(rng: &mut R) -> Result<VapidKeyPair>
where
    R: RngCore + CryptoRng,
{
    VapidKeyPair::generate(rng)
}

/// Generate a VAPID key pair with the OS random source.
///
/// # Returns
/// `(private_key, public_key)` as unpadded URL-safe base64
pub fn generate_vapid_keys() -> Result<(String, String)> {
    let keys = VapidKeyPair::generate(&mut OsRng)?;
    Ok((keys.private_key_base64url(), keys.public_key_base64url()))
}

/// Claims to sign into a VAPID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidClaims {
    /// Origin of the push service.
    pub audience: String,
    /// Contact for the application server (`mailto:` or `https:` URI).
    pub subject: String,
    /// Token lifetime in seconds.
    pub expiry_seconds: u64,
}

impl VapidClaims {
    /// Creates claims with the default lifetime.
    pub fn new(audience: &str, subject: &str) -> Self {
        Self {
            audience: audience.to_string(),
            subject: subject.to_string(),
            expiry_seconds: DEFAULT_VAPID_EXPIRY_SECS,
        }
    }

    /// Creates claims whose audience is the origin of `endpoint`.
    pub fn for_endpoint(endpoint: &str, subject: &str) -> Result<Self> {
        let audience = endpoint_origin(endpoint)
            .map_err(|e| WebPushError::Signing(format!("Cannot derive audience: {}", e)))?;
        Ok(Self::new(&audience, subject))
    }

    /// Sets the token lifetime.
    pub fn with_expiry(mut self, expiry_seconds: u64) -> Self {
        self.expiry_seconds = expiry_seconds;
        self
    }
}

/// JWT header for ES256 tokens.
#[derive(Serialize)]
struct JwtHeader {
    alg: &'static str,
    typ: &'static str,
}

const ES256_HEADER: JwtHeader = JwtHeader {
    alg: "ES256",
    typ: "JWT",
};

/// Claims as they appear in the signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Audience (push service origin).
    pub aud: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
    /// Subject (contact URI).
    pub sub: String,
}

/// A signed VAPID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidToken {
    /// Compact JWS: header.payload.signature
    pub jwt: String,
    /// Signer's public key, unpadded URL-safe base64.
    pub public_key: String,
    /// Audience the token was issued for.
    pub audience: String,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: u64,
}

impl VapidToken {
    /// Value of the `Authorization` header.
    ///
    /// `aes128gcm` uses the RFC 8292 `vapid` scheme. `aesgcm` uses the older
    /// `WebPush` scheme, with the key sent in `Crypto-Key` instead.
    pub fn authorization_header(&self, encoding: ContentEncoding) -> String {
        match encoding {
            ContentEncoding::Aes128Gcm => format!("vapid t={}, k={}", self.jwt, self.public_key),
            ContentEncoding::AesGcm => format!("WebPush {}", self.jwt),
        }
    }

    /// Whether the token has expired at `now` (seconds since the Unix epoch).
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Sign VAPID claims using the current system time.
pub fn sign(keys: &VapidKeyPair, claims: &VapidClaims) -> Result<VapidToken> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| WebPushError::Signing(format!("System clock before Unix epoch: {}", e)))?
        .as_secs();
    sign_at(keys, claims, now)
}

/// Sign VAPID claims as of `now` (seconds since the Unix epoch).
pub fn sign_at(keys: &VapidKeyPair, claims: &VapidClaims, now: u64) -> Result<VapidToken> {
    validate_claims(claims)?;

    let exp = now.checked_add(claims.expiry_seconds).ok_or_else(|| {
        WebPushError::Signing(format!(
            "Token expiry overflows: now {} + {}s",
            now, claims.expiry_seconds
        ))
    })?;

    let payload = JwtClaims {
        aud: claims.audience.clone(),
        exp,
        sub: claims.subject.clone(),
    };

    let header_json = serde_json::to_vec(&ES256_HEADER)
        .map_err(|e| WebPushError::Signing(format!("JWT header serialization failed: {}", e)))?;
    let payload_json = serde_json::to_vec(&payload)
        .map_err(|e| WebPushError::Signing(format!("JWT claims serialization failed: {}", e)))?;

    let signing_input = format!("{}.{}", codec::encode(&header_json), codec::encode(&payload_json));

    let signature: Signature = keys
        .signing_key
        .try_sign(signing_input.as_bytes())
        .map_err(|e| WebPushError::Signing(format!("ES256 signing failed: {}", e)))?;

    let jwt = format!("{}.{}", signing_input, codec::encode(signature.to_bytes().as_slice()));

    Ok(VapidToken {
        jwt,
        public_key: keys.public_key_base64url(),
        audience: payload.aud,
        expires_at: payload.exp,
    })
}

fn validate_claims(claims: &VapidClaims) -> Result<()> {
    if claims.expiry_seconds == 0 {
        return Err(WebPushError::Signing("Token expiry must be positive".into()));
    }

    if claims.expiry_seconds > MAX_VAPID_EXPIRY_SECS {
        return Err(WebPushError::Signing(format!(
            "Token expiry {}s exceeds the {}s push service maximum",
            claims.expiry_seconds, MAX_VAPID_EXPIRY_SECS
        )));
    }

    if claims.subject.is_empty() {
        return Err(WebPushError::Signing("Subject must not be empty".into()));
    }

    if !claims.subject.starts_with("mailto:") && !claims.subject.starts_with("https:") {
        tracing::warn!(
            subject = %claims.subject,
            "VAPID subject is neither a mailto: nor an https: URI"
        );
    }

    let origin = endpoint_origin(&claims.audience)
        .map_err(|e| WebPushError::Signing(format!("Invalid audience: {}", e)))?;
    if claims.audience.trim_end_matches('/') != origin {
        return Err(WebPushError::Signing(format!(
            "Audience must be an origin, got {}",
            claims.audience
        )));
    }

    Ok(())
}

/// Verify a token's ES256 signature against an uncompressed public key.
///
/// # Returns
/// `true` if the signature is valid
pub fn verify_token(jwt: &str, public_key: &[u8]) -> Result<bool> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| WebPushError::InvalidKey("VAPID public key is not a point on P-256".into()))?;

    let Some((signing_input, signature_b64)) = jwt.rsplit_once('.') else {
        return Err(WebPushError::Decode("Token is not a compact JWS".into()));
    };
    if signing_input.matches('.').count() != 1 {
        return Err(WebPushError::Decode("Token must have three segments".into()));
    }

    let signature_bytes = codec::decode(signature_b64)?;
    if signature_bytes.len() != ES256_SIGNATURE_SIZE {
        return Ok(false);
    }

    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return Ok(false);
    };

    Ok(verifying_key.verify(signing_input.as_bytes(), &signature).is_ok())
}

/// Read the claims out of a token without checking its signature.
pub fn decode_claims(jwt: &str) -> Result<JwtClaims> {
    let payload_b64 = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| WebPushError::Decode("Token has no payload segment".into()))?;
    let payload = codec::decode(payload_b64)?;

    serde_json::from_slice(&payload)
        .map_err(|e| WebPushError::Decode(format!("Token claims are not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PRIVATE_KEY_SIZE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // RFC 8291 Appendix A application server key, reused as a fixed VAPID key
    const PRIVATE_KEY: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
    const PUBLIC_KEY: &str =
        "BP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A8";

    const NOW: u64 = 1_700_000_000;

    fn claims() -> VapidClaims {
        VapidClaims::new("https://push.example.net", "mailto:push@example.com")
    }

    #[test]
    fn test_generate_vapid_keys() {
        let (private_key, public_key) = generate_vapid_keys().unwrap();

        let private_bytes = codec::decode(&private_key).unwrap();
        assert_eq!(private_bytes.len(), PRIVATE_KEY_SIZE);
        assert!(!private_key.contains('='));

        let public_bytes = codec::decode(&public_key).unwrap();
        assert_eq!(public_bytes.len(), 65);
        assert_eq!(public_bytes[0], 0x04);
    }

    #[test]
    fn test_from_base64url_roundtrip() {
        let keys = generate_keypair(&mut StdRng::seed_from_u64(3)).unwrap();
        let restored = VapidKeyPair::from_base64url_pair(
            &keys.public_key_base64url(),
            &keys.private_key_base64url(),
        )
        .unwrap();
        assert_eq!(restored.public_key_bytes(), keys.public_key_bytes());
    }

    #[test]
    fn test_known_public_key() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        assert_eq!(keys.public_key_base64url(), PUBLIC_KEY);
        assert_eq!(keys.private_key_base64url(), PRIVATE_KEY);
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let other = generate_keypair(&mut StdRng::seed_from_u64(4)).unwrap();
        let result = VapidKeyPair::from_base64url_pair(&other.public_key_base64url(), PRIVATE_KEY);
        assert!(matches!(result, Err(WebPushError::InvalidKey(_))));
    }

    #[test]
    fn test_rejects_malformed_private_key() {
        assert!(matches!(
            VapidKeyPair::from_base64url("not-a-key"),
            Err(WebPushError::InvalidKey(_)) | Err(WebPushError::Decode(_))
        ));
        assert!(matches!(
            VapidKeyPair::from_bytes(&[0u8; 32]),
            Err(WebPushError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_sign_structure() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        let token = sign_at(&keys, &claims(), NOW).unwrap();

        let parts: Vec<&str> = token.jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&codec::decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["typ"], "JWT");

        assert_eq!(codec::decode(parts[2]).unwrap().len(), ES256_SIGNATURE_SIZE);

        let decoded = decode_claims(&token.jwt).unwrap();
        assert_eq!(decoded.aud, "https://push.example.net");
        assert_eq!(decoded.sub, "mailto:push@example.com");
        assert_eq!(decoded.exp, NOW + DEFAULT_VAPID_EXPIRY_SECS);
        assert_eq!(token.expires_at, decoded.exp);
        assert_eq!(token.public_key, PUBLIC_KEY);
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = generate_keypair(&mut OsRng).unwrap();
        let token = sign(&keys, &claims()).unwrap();
        assert!(verify_token(&token.jwt, keys.public_key_bytes()).unwrap());
    }

    #[test]
    fn test_verify_wrong_key() {
        let keys = generate_keypair(&mut OsRng).unwrap();
        let other = generate_keypair(&mut OsRng).unwrap();
        let token = sign(&keys, &claims()).unwrap();
        assert!(!verify_token(&token.jwt, other.public_key_bytes()).unwrap());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        let token = sign_at(&keys, &claims(), NOW).unwrap();

        let parts: Vec<&str> = token.jwt.split('.').collect();
        let payload = parts[1];
        for index in [0, payload.len() / 2, payload.len() - 1] {
            let mut chars: Vec<char> = payload.chars().collect();
            chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
            let tampered_payload: String = chars.into_iter().collect();
            let tampered = format!("{}.{}.{}", parts[0], tampered_payload, parts[2]);

            assert!(!verify_token(&tampered, keys.public_key_bytes()).unwrap());
        }
    }

    #[test]
    fn test_verify_rejects_malformed_token() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        assert!(matches!(
            verify_token("no-dots-here", keys.public_key_bytes()),
            Err(WebPushError::Decode(_))
        ));
        assert!(matches!(
            verify_token("a.b.c.d", keys.public_key_bytes()),
            Err(WebPushError::Decode(_))
        ));
    }

    #[test]
    fn test_expiry_limits() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();

        let too_long = claims().with_expiry(MAX_VAPID_EXPIRY_SECS + 1);
        assert!(matches!(
            sign_at(&keys, &too_long, NOW),
            Err(WebPushError::Signing(_))
        ));

        let zero = claims().with_expiry(0);
        assert!(matches!(sign_at(&keys, &zero, NOW), Err(WebPushError::Signing(_))));

        let max = claims().with_expiry(MAX_VAPID_EXPIRY_SECS);
        let token = sign_at(&keys, &max, NOW).unwrap();
        assert_eq!(token.expires_at, NOW + MAX_VAPID_EXPIRY_SECS);
        assert!(!token.is_expired_at(NOW));
        assert!(token.is_expired_at(NOW + MAX_VAPID_EXPIRY_SECS));
    }

    #[test]
    fn test_expiry_overflow_is_error() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        assert!(matches!(
            sign_at(&keys, &claims(), u64::MAX - 10),
            Err(WebPushError::Signing(_))
        ));

        let edge = u64::MAX - DEFAULT_VAPID_EXPIRY_SECS;
        assert_eq!(sign_at(&keys, &claims(), edge).unwrap().expires_at, u64::MAX);
    }

    #[test]
    fn test_audience_must_be_origin() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();

        let with_path = VapidClaims::new("https://push.example.net/send/abc", "mailto:a@b.c");
        assert!(matches!(
            sign_at(&keys, &with_path, NOW),
            Err(WebPushError::Signing(_))
        ));

        let empty_subject = VapidClaims::new("https://push.example.net", "");
        assert!(matches!(
            sign_at(&keys, &empty_subject, NOW),
            Err(WebPushError::Signing(_))
        ));
    }

    #[test]
    fn test_claims_for_endpoint() {
        let claims =
            VapidClaims::for_endpoint("https://fcm.googleapis.com/fcm/send/abc", "mailto:a@b.c")
                .unwrap();
        assert_eq!(claims.audience, "https://fcm.googleapis.com");
        assert_eq!(claims.expiry_seconds, DEFAULT_VAPID_EXPIRY_SECS);
    }

    #[test]
    fn test_authorization_header() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        let token = sign_at(&keys, &claims(), NOW).unwrap();

        assert_eq!(
            token.authorization_header(ContentEncoding::Aes128Gcm),
            format!("vapid t={}, k={}", token.jwt, PUBLIC_KEY)
        );
        assert_eq!(
            token.authorization_header(ContentEncoding::AesGcm),
            format!("WebPush {}", token.jwt)
        );
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keys = VapidKeyPair::from_base64url(PRIVATE_KEY).unwrap();
        let debug = format!("{:?}", keys);
        assert!(debug.contains(PUBLIC_KEY));
        assert!(!debug.contains(PRIVATE_KEY));
    }
}
