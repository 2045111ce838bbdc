// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Paystack integration for wallet deposits.
//!
//! Three concerns live here: creating hosted-payment charges, re-querying a
//! charge's authoritative status, and authenticating inbound webhooks. The
//! gateway is an untrusted at-least-once peer: every HTTP call carries a
//! bounded timeout, and webhook bodies are only trusted after their
//! HMAC-SHA512 signature has been recomputed over the raw bytes.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha512;

const DEFAULT_API_BASE_URL: &str = "https://api.paystack.co";

pub const SECRET_KEY_ENV: &str = "PAYSTACK_SECRET_KEY";
pub const API_BASE_URL_ENV: &str = "PAYSTACK_API_BASE_URL";

/// Header carrying the hex HMAC-SHA512 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

/// Charge status as reported by the gateway, collapsed to the three states
/// the ledger distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Pending,
    Success,
    Failed,
}

pub struct CreateChargeRequest<'a> {
    pub reference: &'a str,
    pub amount_minor: u64,
    pub currency: &'a str,
    pub payer_email: &'a str,
    pub callback_url: &'a str,
}

/// Result of a successful charge initialization.
#[derive(Debug, Clone)]
pub struct ChargeSession {
    /// Reference echoed back by the gateway; webhook events carry this.
    pub reference: String,
    /// Hosted payment page the payer is redirected to.
    pub authorization_url: String,
}

/// Result of an explicit verification re-query.
#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub status: ChargeStatus,
    pub raw_status: String,
    pub amount_minor: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaystackError {
    #[error("Paystack configuration missing: {0}")]
    MissingConfig(String),

    #[error("Paystack request failed: {0}")]
    Request(String),

    #[error("Paystack response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    api_base_url: String,
    secret_key: String,
    http: Client,
}

impl PaystackClient {
    pub fn is_configured() -> bool {
        env_optional(SECRET_KEY_ENV).is_some()
    }

    pub fn from_env() -> Result<Self, PaystackError> {
        let api_base_url = env_or_default(API_BASE_URL_ENV, DEFAULT_API_BASE_URL);
        let secret_key = env_required(SECRET_KEY_ENV)?;
        Self::new(api_base_url, secret_key)
    }

    pub fn new(api_base_url: String, secret_key: String) -> Result<Self, PaystackError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PaystackError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url,
            secret_key,
            http,
        })
    }

    /// Initialize a hosted-payment charge.
    ///
    /// Nothing is persisted on our side before this returns: a failure here
    /// must leave no trace, and the returned session's reference (echoed by
    /// the gateway) is what the caller records.
    pub async fn create_charge(
        &self,
        request: CreateChargeRequest<'_>,
    ) -> Result<ChargeSession, PaystackError> {
        let payload = build_initialize_payload(&request);
        let response = self
            .http
            .post(format!(
                "{}/transaction/initialize",
                self.api_base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaystackError::Request(format!("initialize failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaystackError::Request(format!(
                "initialize returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaystackError::InvalidResponse(format!("initialize invalid JSON: {e}")))?;
        parse_initialize_response(&body)
    }

    /// Re-query the authoritative status of a charge by reference.
    pub async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, PaystackError> {
        let response = self
            .http
            .get(format!(
                "{}/transaction/verify/{reference}",
                self.api_base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(|e| PaystackError::Request(format!("verify {reference} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaystackError::Request(format!(
                "verify {reference} returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaystackError::InvalidResponse(format!("verify invalid JSON: {e}")))?;
        parse_verify_response(&body)
    }

    /// Authenticate a webhook delivery against the shared secret.
    ///
    /// Must be called on the raw body bytes before any parsing or storage
    /// access. Comparison happens inside the MAC (constant time).
    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        verify_signature(&self.secret_key, raw_body, signature_header)
    }
}

/// Recompute HMAC-SHA512 over `raw_body` with `secret` and compare against
/// the hex signature from the request header.
pub fn verify_signature(secret: &str, raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(supplied) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&supplied).is_ok()
}

/// A parsed webhook notification.
///
/// Only `event` is required up front; the `data` shape differs per event
/// type, so charge fields are pulled lazily by the accessors below and
/// unknown event types stay parseable (they are acknowledged and ignored).
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    data: Value,
}

impl WebhookEvent {
    pub fn reference(&self) -> Option<&str> {
        self.data.get("reference").and_then(Value::as_str)
    }

    pub fn amount_minor(&self) -> Option<u64> {
        self.data.get("amount").and_then(Value::as_u64)
    }
}

/// Parse a webhook body. Callers must have verified the signature first.
pub fn parse_webhook_event(raw_body: &[u8]) -> Result<WebhookEvent, PaystackError> {
    serde_json::from_slice(raw_body)
        .map_err(|e| PaystackError::InvalidResponse(format!("webhook body invalid: {e}")))
}

pub fn map_charge_status(raw_status: &str) -> ChargeStatus {
    let status = raw_status.trim().to_ascii_lowercase();
    match status.as_str() {
        "success" => ChargeStatus::Success,
        "failed" | "reversed" | "abandoned" => ChargeStatus::Failed,
        _ => ChargeStatus::Pending,
    }
}

fn build_initialize_payload(request: &CreateChargeRequest<'_>) -> Value {
    json!({
        "email": request.payer_email,
        "amount": request.amount_minor,
        "currency": request.currency,
        "reference": request.reference,
        "callback_url": request.callback_url,
    })
}

fn parse_initialize_response(body: &Value) -> Result<ChargeSession, PaystackError> {
    ensure_gateway_ok(body, "initialize")?;

    let authorization_url = body
        .pointer("/data/authorization_url")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PaystackError::InvalidResponse("missing authorization_url in response".to_string())
        })?
        .to_string();
    let reference = body
        .pointer("/data/reference")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PaystackError::InvalidResponse("missing reference in response".to_string())
        })?
        .to_string();

    Ok(ChargeSession {
        reference,
        authorization_url,
    })
}

fn parse_verify_response(body: &Value) -> Result<ChargeVerification, PaystackError> {
    ensure_gateway_ok(body, "verify")?;

    let raw_status = body
        .pointer("/data/status")
        .and_then(Value::as_str)
        .ok_or_else(|| PaystackError::InvalidResponse("missing status in response".to_string()))?
        .to_string();
    let amount_minor = body.pointer("/data/amount").and_then(Value::as_u64);

    Ok(ChargeVerification {
        status: map_charge_status(&raw_status),
        raw_status,
        amount_minor,
    })
}

/// Gateway envelopes carry `status: bool` plus a human `message`; a `false`
/// with HTTP 200 still means the operation was rejected.
fn ensure_gateway_ok(body: &Value, operation: &str) -> Result<(), PaystackError> {
    match body.get("status").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        Some(false) => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            Err(PaystackError::Request(format!(
                "{operation} rejected: {message}"
            )))
        }
        None => Err(PaystackError::InvalidResponse(format!(
            "{operation} response missing status field"
        ))),
    }
}

fn env_required(name: &str) -> Result<String, PaystackError> {
    env_optional(name).ok_or_else(|| PaystackError::MissingConfig(name.to_string()))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn charge_status_mapping_is_stable() {
        assert_eq!(map_charge_status("success"), ChargeStatus::Success);
        assert_eq!(map_charge_status("SUCCESS"), ChargeStatus::Success);
        assert_eq!(map_charge_status("failed"), ChargeStatus::Failed);
        assert_eq!(map_charge_status("reversed"), ChargeStatus::Failed);
        assert_eq!(map_charge_status("abandoned"), ChargeStatus::Failed);
        assert_eq!(map_charge_status("ongoing"), ChargeStatus::Pending);
        assert_eq!(map_charge_status("queued"), ChargeStatus::Pending);
    }

    #[test]
    fn verify_signature_accepts_valid_signature() {
        let body = br#"{"event":"charge.success","data":{"reference":"dep_r1","amount":5000}}"#;
        let signature = sign("sk_test_secret", body);
        assert!(verify_signature("sk_test_secret", body, &signature));
        // Surrounding whitespace in the header is tolerated.
        assert!(verify_signature(
            "sk_test_secret",
            body,
            &format!("  {signature}  ")
        ));
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let body = br#"{"event":"charge.success","data":{"reference":"dep_r1","amount":5000}}"#;
        let tampered = br#"{"event":"charge.success","data":{"reference":"dep_r1","amount":9999}}"#;
        let signature = sign("sk_test_secret", body);
        assert!(!verify_signature("sk_test_secret", tampered, &signature));
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_other_secret", body);
        assert!(!verify_signature("sk_test_secret", body, &signature));
    }

    #[test]
    fn verify_signature_rejects_malformed_hex() {
        let body = br#"{"event":"charge.success"}"#;
        assert!(!verify_signature("sk_test_secret", body, "not hex at all"));
        assert!(!verify_signature("sk_test_secret", body, ""));
    }

    #[test]
    fn parse_webhook_event_extracts_charge_fields() {
        let raw = br#"{"event":"charge.success","data":{"reference":"dep_r1","amount":5000,"status":"success"}}"#;
        let event = parse_webhook_event(raw).unwrap();
        assert_eq!(event.event, "charge.success");
        assert_eq!(event.reference(), Some("dep_r1"));
        assert_eq!(event.amount_minor(), Some(5000));
    }

    #[test]
    fn parse_webhook_event_tolerates_unknown_event_shapes() {
        let raw = br#"{"event":"subscription.create","data":{"subscription_code":"SUB_x"}}"#;
        let event = parse_webhook_event(raw).unwrap();
        assert_eq!(event.event, "subscription.create");
        assert_eq!(event.reference(), None);
        assert_eq!(event.amount_minor(), None);
    }

    #[test]
    fn parse_webhook_event_rejects_invalid_json() {
        assert!(parse_webhook_event(b"not json").is_err());
        assert!(parse_webhook_event(br#"{"data":{}}"#).is_err());
    }

    #[test]
    fn initialize_payload_carries_exact_minor_units() {
        let payload = build_initialize_payload(&CreateChargeRequest {
            reference: "dep_r1",
            amount_minor: 5000,
            currency: "NGN",
            payer_email: "payer@example.com",
            callback_url: "https://wallet.example.com/v1/gateway/callback",
        });
        assert_eq!(payload["amount"], 5000);
        assert_eq!(payload["currency"], "NGN");
        assert_eq!(payload["reference"], "dep_r1");
        assert_eq!(payload["email"], "payer@example.com");
    }

    #[test]
    fn parse_initialize_response_extracts_session() {
        let body = json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc123",
                "access_code": "abc123",
                "reference": "dep_r1"
            }
        });
        let session = parse_initialize_response(&body).unwrap();
        assert_eq!(session.reference, "dep_r1");
        assert_eq!(
            session.authorization_url,
            "https://checkout.paystack.com/abc123"
        );
    }

    #[test]
    fn parse_initialize_response_rejects_gateway_refusal() {
        let body = json!({ "status": false, "message": "Invalid key" });
        let err = parse_initialize_response(&body).unwrap_err();
        assert!(matches!(err, PaystackError::Request(_)));
        assert!(err.to_string().contains("Invalid key"));
    }

    #[test]
    fn parse_initialize_response_rejects_missing_fields() {
        let body = json!({ "status": true, "data": { "reference": "dep_r1" } });
        assert!(matches!(
            parse_initialize_response(&body).unwrap_err(),
            PaystackError::InvalidResponse(_)
        ));
    }

    #[test]
    fn parse_verify_response_maps_status_and_amount() {
        let body = json!({
            "status": true,
            "data": { "status": "success", "amount": 5000, "reference": "dep_r1" }
        });
        let verification = parse_verify_response(&body).unwrap();
        assert_eq!(verification.status, ChargeStatus::Success);
        assert_eq!(verification.raw_status, "success");
        assert_eq!(verification.amount_minor, Some(5000));
    }

    #[test]
    fn parse_verify_response_requires_status() {
        let body = json!({ "status": true, "data": { "amount": 5000 } });
        assert!(matches!(
            parse_verify_response(&body).unwrap_err(),
            PaystackError::InvalidResponse(_)
        ));
    }
}
