//! Assembly of the HTTP request handed to a push service (RFC 8030).
//!
//! Nothing here performs I/O. The result is a method, URL, header list, and
//! body that any HTTP client can send as-is.

use crate::codec;
use crate::envelope::EncryptedMessage;
use crate::subscription::endpoint_origin;
use crate::types::{ContentEncoding, Result, WebPushError, TAG_SIZE};
use crate::vapid::VapidToken;

/// Default message lifetime at the push service (24 hours).
pub const DEFAULT_TTL: u32 = 24 * 60 * 60;

/// Longest `Topic` header value accepted by push services.
pub const MAX_TOPIC_LEN: usize = 32;

/// Delivery urgency hint (RFC 8030 §5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Urgency {
    /// Deliver on power and Wi-Fi only.
    VeryLow,
    /// Deliver on power or Wi-Fi.
    Low,
    /// Deliver unless the battery is low.
    #[default]
    Normal,
    /// Deliver immediately.
    High,
}

impl Urgency {
    /// Header value for this urgency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Urgency {
    type Err = WebPushError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "very-low" => Ok(Urgency::VeryLow),
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            other => Err(WebPushError::Assembly(format!("Unknown urgency: {}", other))),
        }
    }
}

/// A fully assembled push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Always `POST`.
    pub method: String,
    /// The subscription endpoint.
    pub url: String,
    /// Header name/value pairs in send order.
    pub headers: Vec<(String, String)>,
    /// Encrypted body, absent for payload-less pushes.
    pub body: Option<Vec<u8>>,
}

impl DeliveryRequest {
    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body length in bytes (0 without a payload).
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }
}

/// Builder for [`DeliveryRequest`].
#[derive(Debug, Clone)]
pub struct DeliveryRequestBuilder {
    endpoint: String,
    message: Option<EncryptedMessage>,
    token: Option<VapidToken>,
    ttl: u32,
    urgency: Option<Urgency>,
    topic: Option<String>,
}

impl DeliveryRequestBuilder {
    /// Start a request to `endpoint`.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            message: None,
            token: None,
            ttl: DEFAULT_TTL,
            urgency: None,
            topic: None,
        }
    }

    /// Attach an encrypted payload.
    pub fn encrypted(mut self, message: EncryptedMessage) -> Self {
        self.message = Some(message);
        self
    }

    /// Attach a VAPID token.
    pub fn vapid(mut self, token: VapidToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Seconds the push service should hold the message.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the `Urgency` header.
    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    /// Replace any pending message with the same topic.
    pub fn topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    /// Validate and assemble the request.
    pub fn build(self) -> Result<DeliveryRequest> {
        let origin = endpoint_origin(&self.endpoint)?;

        if let Some(token) = &self.token {
            if token.audience.trim_end_matches('/') != origin {
                return Err(WebPushError::Assembly(format!(
                    "VAPID audience {} does not match endpoint origin {}",
                    token.audience, origin
                )));
            }
        }

        let mut headers = vec![("TTL".to_string(), self.ttl.to_string())];

        if let Some(urgency) = self.urgency {
            headers.push(("Urgency".to_string(), urgency.to_string()));
        }

        if let Some(topic) = &self.topic {
            validate_topic(topic)?;
            headers.push(("Topic".to_string(), topic.clone()));
        }

        let body = match &self.message {
            Some(message) => {
                if message.ciphertext.len() < TAG_SIZE {
                    return Err(WebPushError::Assembly(format!(
                        "Ciphertext of {} bytes cannot hold a {}-byte tag",
                        message.ciphertext.len(),
                        TAG_SIZE
                    )));
                }
                push_encryption_headers(&mut headers, message, self.token.as_ref());
                Some(message.encode())
            }
            None => None,
        };

        if let Some(token) = &self.token {
            let encoding = self
                .message
                .as_ref()
                .map_or(ContentEncoding::Aes128Gcm, |message| message.encoding);
            headers.push((
                "Authorization".to_string(),
                token.authorization_header(encoding),
            ));
        }

        tracing::debug!(
            origin = %origin,
            headers = headers.len(),
            body_len = body.as_ref().map_or(0, Vec::len),
            "assembled push request"
        );

        Ok(DeliveryRequest {
            method: "POST".to_string(),
            url: self.endpoint,
            headers,
            body,
        })
    }
}

fn push_encryption_headers(
    headers: &mut Vec<(String, String)>,
    message: &EncryptedMessage,
    token: Option<&VapidToken>,
) {
    headers.push((
        "Content-Encoding".to_string(),
        message.encoding.as_str().to_string(),
    ));

    match message.encoding {
        ContentEncoding::Aes128Gcm => {
            headers.push((
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            ));
        }
        ContentEncoding::AesGcm => {
            headers.push((
                "Encryption".to_string(),
                format!("salt={}", codec::encode(&message.salt)),
            ));

            let mut crypto_key = format!("dh={}", codec::encode(&message.ephemeral_public_key));
            if let Some(token) = token {
                crypto_key.push_str(";p256ecdsa=");
                crypto_key.push_str(&token.public_key);
            }
            headers.push(("Crypto-Key".to_string(), crypto_key));
        }
    }
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
        return Err(WebPushError::Assembly(format!(
            "Topic must be 1 to {} characters, got {}",
            MAX_TOPIC_LEN,
            topic.len()
        )));
    }

    if !topic
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(WebPushError::Assembly(
            "Topic must use the URL-safe base64 alphabet".into(),
        ));
    }

    Ok(())
}
