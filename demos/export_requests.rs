//! Export prepared push requests for inspection or replay with another client.
//!
//! Usage: export_requests [output-dir] [subscriptions.json]
//!
//! Without a subscriptions file, a single subscription built from the
//! RFC 8291 Appendix A user agent key is used.

use std::fs;
use std::path::Path;

use tracing_subscriber::EnvFilter;
use webpush::{
    generate_vapid_keys, PushSender, SenderConfig, Subscription, Urgency, VapidConfig,
    VapidKeyPair,
};

const UA_PUBLIC: &str =
    "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
const AUTH_SECRET: &str = "BTBZMqHH6r4Tts7J_aSIgg";

fn default_subscriptions() -> Vec<Subscription> {
    vec![Subscription::new(
        "https://push.example.net/push/JzLQ3raZJfFBR0aqvOMsLrt54w4rJUsV",
        UA_PUBLIC,
        AUTH_SECRET,
    )
    .with_id("rfc8291")]
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let output_dir = args.get(1).map(|s| s.as_str()).unwrap_or("push-requests");

    let subscriptions = match args.get(2) {
        Some(path) => {
            let json = fs::read_to_string(path).unwrap();
            serde_json::from_str::<Vec<Subscription>>(&json).unwrap()
        }
        None => default_subscriptions(),
    };

    let (private_key, public_key) = generate_vapid_keys().unwrap();
    println!("VAPID public key: {}", public_key);

    let vapid = VapidConfig::new(
        VapidKeyPair::from_base64url(&private_key).unwrap(),
        "mailto:push@example.com",
    );
    let sender = PushSender::new(SenderConfig::default().with_urgency(Urgency::Normal))
        .with_vapid(vapid);

    let output_path = Path::new(output_dir);
    fs::create_dir_all(output_path).unwrap();

    let outcomes = sender
        .prepare_batch(subscriptions, b"When I grow up, I want to be a watermelon")
        .await;

    let mut count = 0;
    for (index, outcome) in outcomes.iter().enumerate() {
        let name = if outcome.subscription_id.is_empty() {
            format!("request-{}", index)
        } else {
            outcome.subscription_id.clone()
        };

        match &outcome.result {
            Ok(request) => {
                let exported = serde_json::json!({
                    "method": request.method,
                    "url": request.url,
                    "headers": request.headers,
                    "body_hex": request.body.as_ref().map(hex::encode),
                });
                let file_path = output_path.join(format!("{}.json", name));
                fs::write(&file_path, serde_json::to_string_pretty(&exported).unwrap()).unwrap();
                println!("ok   {}", name);
                count += 1;
            }
            Err(e) => println!("fail {}: {}", name, e),
        }
    }

    println!("exported {} requests to {}", count, output_dir);
}
