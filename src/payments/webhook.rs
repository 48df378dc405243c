// src/payments/webhook.rs

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Event type that carries a finished checkout.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Minimal envelope of a provider webhook event.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Checkout session id for `checkout.session.completed` events.
    pub fn checkout_session_id(&self) -> Option<&str> {
        if self.event_type != CHECKOUT_COMPLETED {
            return None;
        }
        self.data.object.get("id").and_then(|v| v.as_str())
    }

    /// True when the event reports a checkout that has not been paid yet, as
    /// with delayed payment methods. Those are acknowledged and left alone.
    pub fn is_unpaid_checkout(&self) -> bool {
        self.data
            .object
            .get("payment_status")
            .and_then(|v| v.as_str())
            .is_some_and(|status| status != "paid")
    }
}

#[derive(Debug, PartialEq)]
pub enum SignatureError {
    MalformedHeader,
    StaleTimestamp,
    Mismatch,
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`).
///
/// The signed payload is `"{t}.{body}"`, keyed with the endpoint secret.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::StaleTimestamp);
    }

    let matched = candidates.iter().any(|signature| {
        keyed_mac(payload, secret, timestamp)
            .map(|mac| mac.verify_slice(signature).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn keyed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Builds a header value the way the provider does. Used by tests and tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Option<String> {
    let mac = keyed_mac(payload, secret, timestamp)?;
    Some(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
