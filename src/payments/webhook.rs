//! Verification and decoding of payment-processor webhook deliveries.
//!
//! The processor signs each delivery with `Stripe-Signature: t=<unix>,v1=<hex>`,
//! where the signature is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the
//! endpoint secret. The signature is checked against the raw bytes before the
//! body is parsed; nothing in the payload is trusted until then.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::AppError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
/// Maximum age, in seconds, of a signed delivery.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Checks `header` against `payload`, with `now` as the current unix time.
    pub fn verify(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), AppError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(AppError::MissingSignature)?;
        let (timestamp, signatures) = parse_header(header).ok_or(AppError::InvalidSignature)?;

        match now.checked_sub(timestamp).and_then(i64::checked_abs) {
            Some(age) if age <= self.tolerance_secs => {}
            _ => {
                tracing::warn!(timestamp, now, "webhook signature outside tolerance window");
                return Err(AppError::InvalidSignature);
            }
        }

        let expected = self.compute(payload, timestamp)?;
        let matched = signatures
            .iter()
            .any(|candidate| bool::from(candidate.as_slice().ct_eq(expected.as_slice())));
        if matched {
            Ok(())
        } else {
            tracing::warn!("webhook signature mismatch");
            Err(AppError::InvalidSignature)
        }
    }

    /// Produces a header value for `payload`; used by tooling and tests to
    /// simulate processor deliveries.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, AppError> {
        let mac = self.compute(payload, timestamp)?;
        Ok(format!("t={timestamp},v1={}", hex::encode(mac)))
    }

    fn compute(&self, payload: &[u8], timestamp: i64) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| AppError::Internal(anyhow::anyhow!("invalid webhook secret: {err}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Splits `t=…,v1=…,v1=…`. Unknown schemes (e.g. `v0`) are skipped; a header
/// without a timestamp or without any usable `v1` entry is rejected.
fn parse_header(header: &str) -> Option<(i64, Vec<Vec<u8>>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }
    match (timestamp, signatures.is_empty()) {
        (Some(t), false) => Some((t, signatures)),
        _ => None,
    }
}

//--------------------------------------        Events         ---------------------------------------------------------

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: ProcessorEvent,
}

/// The processor events this service acts on. Everything else lands in
/// `Unhandled` and is acknowledged without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    PaymentSucceeded(PaymentIntentEvent),
    PaymentFailed(PaymentIntentEvent),
    Unhandled { kind: String },
}

impl ProcessorEvent {
    pub fn type_name(&self) -> &str {
        match self {
            ProcessorEvent::PaymentSucceeded(_) => PAYMENT_SUCCEEDED,
            ProcessorEvent::PaymentFailed(_) => PAYMENT_FAILED,
            ProcessorEvent::Unhandled { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentEvent {
    pub intent_id: String,
    pub order_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawPaymentIntent {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl RawPaymentIntent {
    fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        self.metadata.get(key).and_then(|v| Uuid::parse_str(v).ok())
    }
}

/// Decodes a verified webhook body.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
    let raw: RawEvent = serde_json::from_slice(payload)?;
    let kind = match raw.kind.as_str() {
        PAYMENT_SUCCEEDED | PAYMENT_FAILED => {
            let intent: RawPaymentIntent = serde_json::from_value(raw.data.object)?;
            let event = PaymentIntentEvent {
                order_id: intent.metadata_uuid("orderId"),
                user_id: intent.metadata_uuid("userId"),
                intent_id: intent.id,
            };
            if raw.kind == PAYMENT_SUCCEEDED {
                ProcessorEvent::PaymentSucceeded(event)
            } else {
                ProcessorEvent::PaymentFailed(event)
            }
        }
        _ => ProcessorEvent::Unhandled { kind: raw.kind },
    };
    Ok(WebhookEvent { id: raw.id, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test")
    }

    #[test]
    fn signed_payload_verifies() {
        let body = br#"{"id":"evt_1"}"#;
        let header = verifier().sign(body, NOW).unwrap();
        assert!(verifier().verify(body, Some(&header), NOW + 10).is_ok());
    }

    #[test]
    fn missing_header_is_distinct_from_bad_signature() {
        let body = b"{}";
        assert!(matches!(
            verifier().verify(body, None, NOW),
            Err(AppError::MissingSignature)
        ));
        assert!(matches!(
            verifier().verify(body, Some("  "), NOW),
            Err(AppError::MissingSignature)
        ));
        assert!(matches!(
            verifier().verify(body, Some("garbage"), NOW),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = verifier().sign(br#"{"amount":100}"#, NOW).unwrap();
        assert!(matches!(
            verifier().verify(br#"{"amount":999}"#, Some(&header), NOW),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn other_secret_is_rejected() {
        let body = b"{}";
        let header = WebhookVerifier::new("someone_else").sign(body, NOW).unwrap();
        assert!(verifier().verify(body, Some(&header), NOW).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let body = b"{}";
        let header = verifier().sign(body, NOW).unwrap();
        assert!(matches!(
            verifier().verify(body, Some(&header), NOW + DEFAULT_TOLERANCE_SECS + 1),
            Err(AppError::InvalidSignature)
        ));
        assert!(verifier()
            .with_tolerance(10_000)
            .verify(body, Some(&header), NOW + DEFAULT_TOLERANCE_SECS + 1)
            .is_ok());
    }

    #[test]
    fn extreme_timestamp_is_rejected() {
        let body = b"{}";
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={timestamp},v1={}", "00".repeat(32));
            assert!(matches!(
                verifier().verify(body, Some(&header), NOW),
                Err(AppError::InvalidSignature)
            ));
        }
        let header = verifier().sign(body, NOW).unwrap();
        assert!(matches!(
            verifier().verify(body, Some(&header), i64::MIN),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let body = b"{}";
        let good = verifier().sign(body, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v0=abc,v1={},v1={good_sig}", "00".repeat(32));
        assert!(verifier().verify(body, Some(&header), NOW).is_ok());
    }

    #[test]
    fn decodes_payment_succeeded() {
        let order_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let body = serde_json::json!({
            "id": "evt_123",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_1",
                "amount": 6000,
                "metadata": {"orderId": order_id.to_string(), "userId": user_id.to_string()}
            }}
        });
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(
            event.kind,
            ProcessorEvent::PaymentSucceeded(PaymentIntentEvent {
                intent_id: "pi_1".into(),
                order_id: Some(order_id),
                user_id: Some(user_id),
            })
        );
    }

    #[test]
    fn decodes_payment_failed_without_metadata() {
        let body = br#"{"id":"evt_9","type":"payment_intent.payment_failed","data":{"object":{"id":"pi_9"}}}"#;
        let event = parse_event(body).unwrap();
        assert!(matches!(
            event.kind,
            ProcessorEvent::PaymentFailed(PaymentIntentEvent { order_id: None, .. })
        ));
    }

    #[test]
    fn unknown_types_are_unhandled_not_errors() {
        let body = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"anything":true}}}"#;
        let event = parse_event(body).unwrap();
        assert_eq!(
            event.kind,
            ProcessorEvent::Unhandled {
                kind: "charge.refunded".into()
            }
        );
        assert_eq!(event.kind.type_name(), "charge.refunded");
    }
}
