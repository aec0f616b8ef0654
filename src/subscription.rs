//! Browser push subscriptions and their decoded key material.

use p256::PublicKey;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::codec;
use crate::keys::parse_public_key;
use crate::types::{Result, WebPushError, AUTH_SECRET_SIZE, PUBLIC_KEY_SIZE};

/// Base64 key text as delivered by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Subscriber's P-256 ECDH public key.
    pub p256dh: String,
    /// Shared authentication secret.
    pub auth: String,
}

/// A browser's push subscription.
///
/// Serializes in the shape of `PushSubscription.toJSON()`, plus an optional
/// caller-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Caller-assigned identifier, opaque to this crate.
    #[serde(default, rename = "subscriptionId", skip_serializing_if = "String::is_empty")]
    pub subscription_id: String,
    /// Key material in base64 text form.
    pub keys: SubscriptionKeys,
}

impl Subscription {
    /// Creates a subscription from its endpoint and base64 keys.
    pub fn new(endpoint: &str, p256dh: &str, auth: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            subscription_id: String::new(),
            keys: SubscriptionKeys {
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
        }
    }

    /// Sets the caller-assigned identifier.
    pub fn with_id(mut self, subscription_id: &str) -> Self {
        self.subscription_id = subscription_id.to_string();
        self
    }

    /// Decode and validate the key material.
    pub fn decode_key(&self) -> Result<SubscriptionKey> {
        SubscriptionKey::from_base64(&self.keys.p256dh, &self.keys.auth)
    }

    /// Origin of the endpoint, used as the VAPID audience.
    pub fn audience(&self) -> Result<String> {
        endpoint_origin(&self.endpoint)
    }
}

/// Validated subscription key material.
#[derive(Clone)]
pub struct SubscriptionKey {
    public_key: PublicKey,
    p256dh: [u8; PUBLIC_KEY_SIZE],
    auth: [u8; AUTH_SECRET_SIZE],
}

impl SubscriptionKey {
    /// Validate raw key bytes.
    ///
    /// `p256dh` must be a 65-byte uncompressed point on P-256 and `auth`
    /// exactly 16 bytes.
    pub fn from_bytes(p256dh: &[u8], auth: &[u8]) -> Result<Self> {
        let public_key = parse_public_key(p256dh)?;

        let auth: [u8; AUTH_SECRET_SIZE] = auth.try_into().map_err(|_| {
            WebPushError::InvalidKey(format!(
                "Auth secret must be {} bytes, got {}",
                AUTH_SECRET_SIZE,
                auth.len()
            ))
        })?;

        let mut point = [0u8; PUBLIC_KEY_SIZE];
        point.copy_from_slice(p256dh);

        Ok(Self {
            public_key,
            p256dh: point,
            auth,
        })
    }

    /// Decode and validate base64 key text.
    pub fn from_base64(p256dh: &str, auth: &str) -> Result<Self> {
        let p256dh = codec::decode(p256dh)?;
        let auth = codec::decode(auth)?;
        Self::from_bytes(&p256dh, &auth)
    }

    /// The subscriber's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The subscriber's public key, uncompressed.
    pub fn p256dh(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.p256dh
    }

    /// The authentication secret.
    pub fn auth(&self) -> &[u8; AUTH_SECRET_SIZE] {
        &self.auth
    }
}

impl std::fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionKey")
            .field("p256dh", &codec::encode(&self.p256dh))
            .finish_non_exhaustive()
    }
}

/// Origin (`scheme://host[:port]`) of an absolute http(s) URL.
pub fn endpoint_origin(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| WebPushError::Assembly(format!("Invalid endpoint URL: {}", e)))?;

    if !matches!(url.scheme(), "https" | "http") {
        return Err(WebPushError::Assembly(format!(
            "Endpoint must use http or https, got {}",
            url.scheme()
        )));
    }

    let host = url
        .host()
        .ok_or_else(|| WebPushError::Assembly("Endpoint URL has no host".into()))?;

    let host = match host {
        url::Host::Domain(domain) => domain.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_as, Base64Variant};

    const UA_PUBLIC: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const AUTH_SECRET: &str = "BTBZMqHH6r4Tts7J_aSIgg";

    #[test]
    fn test_decode_url_safe_keys() {
        let sub = Subscription::new("https://push.example.com/abc", UA_PUBLIC, AUTH_SECRET);
        let key = sub.decode_key().unwrap();
        assert_eq!(key.p256dh()[0], 0x04);
        assert_eq!(key.auth().len(), 16);
    }

    #[test]
    fn test_decode_standard_padded_keys() {
        let p256dh = encode_as(&codec::decode(UA_PUBLIC).unwrap(), Base64Variant::Standard);
        let auth = encode_as(&codec::decode(AUTH_SECRET).unwrap(), Base64Variant::Standard);
        let key = SubscriptionKey::from_base64(&p256dh, &auth).unwrap();
        assert_eq!(codec::encode(key.p256dh()), UA_PUBLIC);
    }

    #[test]
    fn test_rejects_short_auth() {
        let result = SubscriptionKey::from_base64(UA_PUBLIC, "AAAA");
        assert!(matches!(result, Err(WebPushError::InvalidKey(_))));
    }

    #[test]
    fn test_rejects_bad_point() {
        let mut point = codec::decode(UA_PUBLIC).unwrap();
        point[40] ^= 0xff;
        let auth = codec::decode(AUTH_SECRET).unwrap();
        let result = SubscriptionKey::from_bytes(&point, &auth);
        assert!(matches!(result, Err(WebPushError::InvalidKey(_))));
    }

    #[test]
    fn test_rejects_bad_base64() {
        let sub = Subscription::new("https://push.example.com/abc", "###", AUTH_SECRET);
        assert!(matches!(sub.decode_key(), Err(WebPushError::Decode(_))));
    }

    #[test]
    fn test_browser_json_shape() {
        let json = format!(
            r#"{{"endpoint":"https://fcm.googleapis.com/fcm/send/x","expirationTime":null,"keys":{{"p256dh":"{}","auth":"{}"}}}}"#,
            UA_PUBLIC, AUTH_SECRET
        );
        let sub: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(sub.endpoint, "https://fcm.googleapis.com/fcm/send/x");
        assert!(sub.subscription_id.is_empty());
        assert!(sub.decode_key().is_ok());

        let out = serde_json::to_string(&sub.clone().with_id("sub-1")).unwrap();
        let back: Subscription = serde_json::from_str(&out).unwrap();
        assert_eq!(back.subscription_id, "sub-1");
    }

    #[test]
    fn test_endpoint_origin() {
        assert_eq!(
            endpoint_origin("https://fcm.googleapis.com/fcm/send/abc").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            endpoint_origin("https://push.example.com:8443/x?y=1").unwrap(),
            "https://push.example.com:8443"
        );
        assert_eq!(
            endpoint_origin("http://[::1]:8080/push").unwrap(),
            "http://[::1]:8080"
        );
    }

    #[test]
    fn test_endpoint_origin_rejects_invalid() {
        assert!(matches!(
            endpoint_origin("not a url"),
            Err(WebPushError::Assembly(_))
        ));
        assert!(matches!(
            endpoint_origin("ftp://push.example.com/x"),
            Err(WebPushError::Assembly(_))
        ));
    }
}
