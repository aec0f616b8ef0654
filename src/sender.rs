//! Preparing push requests for one or many subscriptions.
//!
//! The sender holds configuration only. Each call takes its subscriptions
//! explicitly and returns one result per subscription, in input order.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::crypto::{encrypt_message, EncryptionConfig};
use crate::request::{DeliveryRequest, DeliveryRequestBuilder, Urgency, DEFAULT_TTL};
use crate::subscription::Subscription;
use crate::types::{Result, WebPushError, DEFAULT_VAPID_EXPIRY_SECS};
use crate::vapid::{sign, VapidClaims, VapidKeyPair, VapidToken};

/// Configuration for a [`PushSender`].
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Payload encryption settings.
    pub encryption: EncryptionConfig,
    /// Seconds the push service should hold each message.
    pub ttl: u32,
    /// Optional urgency hint.
    pub urgency: Option<Urgency>,
    /// Optional replacement topic.
    pub topic: Option<String>,
    /// Maximum number of messages encrypted concurrently in a batch.
    pub workers: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            encryption: EncryptionConfig::default(),
            ttl: DEFAULT_TTL,
            urgency: None,
            topic: None,
            workers: 8,
        }
    }
}

impl SenderConfig {
    /// Sets the payload encryption settings.
    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets the TTL sent with every request.
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the urgency sent with every request.
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    /// Sets the topic sent with every request.
    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    /// Sets the batch concurrency limit (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// VAPID identity used to sign requests.
#[derive(Debug, Clone)]
pub struct VapidConfig {
    /// Signing key pair.
    pub keys: VapidKeyPair,
    /// Contact URI placed in the `sub` claim.
    pub subject: String,
    /// Token lifetime in seconds.
    pub token_lifetime: u64,
}

impl VapidConfig {
    /// Creates a VAPID identity with the default token lifetime.
    pub fn new(keys: VapidKeyPair, subject: &str) -> Self {
        Self {
            keys,
            subject: subject.to_string(),
            token_lifetime: DEFAULT_VAPID_EXPIRY_SECS,
        }
    }

    /// Sets the token lifetime in seconds (at most 24 hours).
    pub fn with_token_lifetime(mut self, token_lifetime: u64) -> Self {
        self.token_lifetime = token_lifetime;
        self
    }

    /// Sign a token for `audience`.
    pub fn sign_for(&self, audience: &str) -> Result<VapidToken> {
        let claims = VapidClaims::new(audience, &self.subject).with_expiry(self.token_lifetime);
        sign(&self.keys, &claims)
    }
}

/// Result of preparing one subscription in a batch.
#[derive(Debug)]
pub struct DeliveryOutcome {
    /// Caller-assigned subscription identifier.
    pub subscription_id: String,
    /// Subscription endpoint.
    pub endpoint: String,
    /// The prepared request, or why it could not be prepared.
    pub result: Result<DeliveryRequest>,
}

impl DeliveryOutcome {
    /// Whether a request was prepared.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Tokens signed ahead of a batch, keyed by audience.
///
/// Failures keep the bare signing message; [`lookup_token`] rewraps it.
type TokenMap = HashMap<String, std::result::Result<VapidToken, String>>;

/// Prepares encrypted, signed push requests.
#[derive(Debug, Clone, Default)]
pub struct PushSender {
    config: SenderConfig,
    vapid: Option<VapidConfig>,
}

impl PushSender {
    /// Creates a sender without a VAPID identity.
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            vapid: None,
        }
    }

    /// Sign every request with `vapid`.
    pub fn with_vapid(mut self, vapid: VapidConfig) -> Self {
        self.vapid = Some(vapid);
        self
    }

    /// The sender's configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Prepare a request for a single subscription.
    pub fn prepare(&self, subscription: &Subscription, payload: &[u8]) -> Result<DeliveryRequest> {
        let token = match &self.vapid {
            Some(vapid) => Some(vapid.sign_for(&subscription.audience()?)?),
            None => None,
        };
        prepare_with(subscription, payload, &self.config, token, &mut OsRng)
    }

    /// Prepare requests for many subscriptions concurrently.
    ///
    /// One token is signed per distinct audience before any encryption starts.
    /// At most `workers` messages are encrypted at a time. A failing
    /// subscription yields an error outcome and the rest carry on.
    ///
    /// # Panics
    /// Encryption runs on Tokio's blocking pool, so the returned future must
    /// be polled inside a Tokio runtime.
    pub async fn prepare_batch(
        &self,
        subscriptions: Vec<Subscription>,
        payload: &[u8],
    ) -> Vec<DeliveryOutcome> {
        let total = subscriptions.len();
        let tokens = Arc::new(
            self.vapid
                .as_ref()
                .map(|vapid| sign_audiences(vapid, &subscriptions)),
        );
        let payload: Arc<[u8]> = Arc::from(payload);
        let config = Arc::new(self.config.clone());

        let outcomes: Vec<DeliveryOutcome> = stream::iter(subscriptions)
            .map(|subscription| {
                let tokens = Arc::clone(&tokens);
                let payload = Arc::clone(&payload);
                let config = Arc::clone(&config);

                async move {
                    let subscription_id = subscription.subscription_id.clone();
                    let endpoint = subscription.endpoint.clone();

                    let task = tokio::task::spawn_blocking(move || {
                        let token = lookup_token(&subscription, (*tokens).as_ref())?;
                        prepare_with(&subscription, &payload, &config, token, &mut OsRng)
                    });

                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(WebPushError::WorkerFailed(format!(
                            "Encryption task failed: {}",
                            e
                        ))),
                    };

                    DeliveryOutcome {
                        subscription_id,
                        endpoint,
                        result,
                    }
                }
            })
            .buffered(self.config.workers.max(1))
            .collect()
            .await;

        let mut failed = 0;
        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                failed += 1;
                tracing::warn!(
                    subscription_id = %outcome.subscription_id,
                    error = %e,
                    "failed to prepare push request"
                );
            }
        }

        tracing::info!(
            total,
            prepared = total - failed,
            failed,
            "prepared push batch"
        );

        outcomes
    }
}

fn sign_audiences(vapid: &VapidConfig, subscriptions: &[Subscription]) -> TokenMap {
    let mut tokens = TokenMap::new();
    for subscription in subscriptions {
        // Unparseable endpoints fail again, with their own error, in the worker
        let Ok(audience) = subscription.audience() else {
            continue;
        };
        if tokens.contains_key(&audience) {
            continue;
        }
        let token = vapid.sign_for(&audience).map_err(|e| match e {
            WebPushError::Signing(message) => message,
            other => other.to_string(),
        });
        tokens.insert(audience, token);
    }

    tracing::debug!(audiences = tokens.len(), "signed VAPID tokens for batch");
    tokens
}

fn lookup_token(
    subscription: &Subscription,
    tokens: Option<&TokenMap>,
) -> Result<Option<VapidToken>> {
    let Some(tokens) = tokens else {
        return Ok(None);
    };

    let audience = subscription.audience()?;
    match tokens.get(&audience) {
        Some(Ok(token)) => Ok(Some(token.clone())),
        Some(Err(e)) => Err(WebPushError::Signing(e.clone())),
        None => Err(WebPushError::Signing(format!("No token signed for {}", audience))),
    }
}

/// Decode, encrypt, and assemble one request.
fn prepare_with<R>(
    subscription: &Subscription,
    payload: &[u8],
    config: &SenderConfig,
    token: Option<VapidToken>,
    rng: &mut R,
) -> Result<DeliveryRequest>
where
    R: RngCore + CryptoRng,
{
    let key = subscription.decode_key()?;
    let message = encrypt_message(payload, &key, &config.encryption, rng)?;

    let mut builder = DeliveryRequestBuilder::new(&subscription.endpoint)
        .encrypted(message)
        .ttl(config.ttl);

    if let Some(urgency) = config.urgency {
        builder = builder.urgency(urgency);
    }
    if let Some(topic) = &config.topic {
        builder = builder.topic(topic);
    }
    if let Some(token) = token {
        builder = builder.vapid(token);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::crypto::decrypt_body;
    use crate::keys::{generate_ephemeral_keypair, EphemeralKeyPair};
    use crate::types::ContentEncoding;
    use crate::vapid::{decode_claims, verify_token};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const VAPID_PRIVATE: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";

    struct Browser {
        keys: EphemeralKeyPair,
        auth: [u8; 16],
        subscription: Subscription,
    }

    fn browser(rng: &mut StdRng, endpoint: &str, id: &str) -> Browser {
        let keys = generate_ephemeral_keypair(rng).unwrap();
        let mut auth = [0u8; 16];
        rng.fill_bytes(&mut auth);
        let subscription = Subscription::new(
            endpoint,
            &codec::encode(&keys.public_bytes()),
            &codec::encode(&auth),
        )
        .with_id(id);
        Browser {
            keys,
            auth,
            subscription,
        }
    }

    fn vapid() -> VapidConfig {
        VapidConfig::new(
            VapidKeyPair::from_base64url(VAPID_PRIVATE).unwrap(),
            "mailto:ops@example.com",
        )
    }

    #[test]
    fn test_prepare_single() {
        let mut rng = StdRng::seed_from_u64(21);
        let browser = browser(&mut rng, "https://push.example.net/send/1", "a");
        let sender = PushSender::new(SenderConfig::default().with_urgency(Urgency::Low))
            .with_vapid(vapid());

        let request = sender.prepare(&browser.subscription, b"ping").unwrap();

        assert_eq!(request.header("Urgency"), Some("low"));
        assert_eq!(request.header("TTL"), Some("86400"));

        let authorization = request.header("Authorization").unwrap();
        let jwt = authorization
            .strip_prefix("vapid t=")
            .and_then(|rest| rest.split(',').next())
            .unwrap();
        let claims = decode_claims(jwt).unwrap();
        assert_eq!(claims.aud, "https://push.example.net");
        let keys = VapidKeyPair::from_base64url(VAPID_PRIVATE).unwrap();
        assert!(verify_token(jwt, keys.public_key_bytes()).unwrap());

        let body = request.body.unwrap();
        assert_eq!(decrypt_body(&body, &browser.keys, &browser.auth).unwrap(), b"ping");
    }

    #[test]
    fn test_prepare_without_vapid() {
        let mut rng = StdRng::seed_from_u64(22);
        let browser = browser(&mut rng, "https://push.example.net/send/1", "a");
        let sender = PushSender::default();

        let request = sender.prepare(&browser.subscription, b"").unwrap();
        assert!(request.header("Authorization").is_none());
        assert_eq!(
            decrypt_body(request.body.as_ref().unwrap(), &browser.keys, &browser.auth).unwrap(),
            b""
        );
    }

    #[test]
    fn test_prepare_legacy() {
        let mut rng = StdRng::seed_from_u64(23);
        let browser = browser(&mut rng, "https://push.example.net/send/1", "a");
        let config = SenderConfig::default().with_encryption(EncryptionConfig::legacy());
        let sender = PushSender::new(config).with_vapid(vapid());

        let request = sender.prepare(&browser.subscription, b"legacy").unwrap();
        assert_eq!(
            request.header("Content-Encoding"),
            Some(ContentEncoding::AesGcm.as_str())
        );
        assert!(request.header("Authorization").unwrap().starts_with("WebPush "));
        assert!(request.header("Crypto-Key").unwrap().contains(";p256ecdsa="));
    }

    #[test]
    fn test_prepare_rejects_bad_keys() {
        let subscription = Subscription::new("https://push.example.net/send/1", "###", "AAAA");
        let sender = PushSender::default();
        assert!(matches!(
            sender.prepare(&subscription, b"x"),
            Err(WebPushError::Decode(_))
        ));
    }

    #[test]
    fn test_prepare_oversized_payload() {
        let mut rng = StdRng::seed_from_u64(24);
        let browser = browser(&mut rng, "https://push.example.net/send/1", "a");
        let sender = PushSender::default();
        let payload = vec![0u8; 4096];
        assert!(matches!(
            sender.prepare(&browser.subscription, &payload),
            Err(WebPushError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_hundred_subscriptions() {
        let mut rng = StdRng::seed_from_u64(25);
        let browsers: Vec<Browser> = (0..100)
            .map(|i| {
                browser(
                    &mut rng,
                    &format!("https://push{}.example.net/send/{}", i % 3, i),
                    &format!("sub-{}", i),
                )
            })
            .collect();
        let subscriptions = browsers.iter().map(|b| b.subscription.clone()).collect();

        let sender = PushSender::new(SenderConfig::default().with_workers(4)).with_vapid(vapid());
        let outcomes = sender.prepare_batch(subscriptions, b"batch payload").await;

        assert_eq!(outcomes.len(), 100);

        let mut bodies = HashSet::new();
        for (i, (outcome, browser)) in outcomes.iter().zip(&browsers).enumerate() {
            assert_eq!(outcome.subscription_id, format!("sub-{}", i));
            assert_eq!(outcome.endpoint, browser.subscription.endpoint);

            let request = outcome.result.as_ref().unwrap();
            let body = request.body.clone().unwrap();
            assert_eq!(
                decrypt_body(&body, &browser.keys, &browser.auth).unwrap(),
                b"batch payload"
            );
            assert!(bodies.insert(body));
        }
    }

    #[tokio::test]
    async fn test_batch_shares_token_per_audience() {
        let mut rng = StdRng::seed_from_u64(26);
        let subscriptions = vec![
            browser(&mut rng, "https://push.example.net/a", "a").subscription,
            browser(&mut rng, "https://push.example.net/b", "b").subscription,
            browser(&mut rng, "https://other.example.org/c", "c").subscription,
        ];

        let sender = PushSender::default().with_vapid(vapid());
        let outcomes = sender.prepare_batch(subscriptions, b"x").await;

        let authorization = |i: usize| {
            outcomes[i]
                .result
                .as_ref()
                .unwrap()
                .header("Authorization")
                .unwrap()
                .to_string()
        };
        assert_eq!(authorization(0), authorization(1));
        assert_ne!(authorization(0), authorization(2));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let mut rng = StdRng::seed_from_u64(27);
        let good = browser(&mut rng, "https://push.example.net/ok", "good");
        let bad_key = Subscription::new("https://push.example.net/bad", "###", "AAAA").with_id("bad-key");
        let mut bad_endpoint = browser(&mut rng, "https://push.example.net/x", "bad-endpoint").subscription;
        bad_endpoint.endpoint = "not a url".to_string();

        let subscriptions = vec![bad_key, good.subscription.clone(), bad_endpoint];
        let sender = PushSender::default().with_vapid(vapid());
        let outcomes = sender.prepare_batch(subscriptions, b"still delivered").await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].result, Err(WebPushError::Decode(_))));
        assert!(outcomes[1].is_ok());
        assert!(matches!(outcomes[2].result, Err(WebPushError::Assembly(_))));

        let body = outcomes[1].result.as_ref().unwrap().body.clone().unwrap();
        assert_eq!(
            decrypt_body(&body, &good.keys, &good.auth).unwrap(),
            b"still delivered"
        );
    }

    #[tokio::test]
    async fn test_batch_signing_failure_reported() {
        let mut rng = StdRng::seed_from_u64(28);
        let subscriptions = vec![browser(&mut rng, "https://push.example.net/a", "a").subscription];

        let sender = PushSender::default().with_vapid(vapid().with_token_lifetime(0));
        let outcomes = sender.prepare_batch(subscriptions, b"x").await;

        let Err(error) = &outcomes[0].result else {
            panic!("expected a signing error");
        };
        assert!(matches!(error, WebPushError::Signing(_)));
        assert_eq!(error.to_string().matches("Signing failed").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcomes = PushSender::default().prepare_batch(Vec::new(), b"x").await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_workers_minimum() {
        assert_eq!(SenderConfig::default().with_workers(0).workers, 1);
    }
}
