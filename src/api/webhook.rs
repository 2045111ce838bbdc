// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Paystack webhook receiver, the sole crediting path for deposits.
//!
//! The order of operations is fixed: authenticate the raw body first
//! (HMAC-SHA512 against the gateway secret), parse second, touch the ledger
//! last. Every fully processed event is acknowledged with 200 even when it
//! changes nothing; the gateway retries anything else.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::{
    providers::paystack::{self, PaystackClient, WebhookEvent},
    state::AppState,
    storage::{AuditEvent, AuditEventType, LedgerError, SettleOutcome, TxStatus},
};

/// Acknowledgment body returned to the gateway.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Whether the event was processed (including benign no-ops).
    pub status: bool,
    /// Short outcome description.
    pub message: String,
}

fn ack(message: &str) -> (StatusCode, Json<WebhookAck>) {
    (
        StatusCode::OK,
        Json(WebhookAck {
            status: true,
            message: message.to_string(),
        }),
    )
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<WebhookAck>) {
    (
        status,
        Json(WebhookAck {
            status: false,
            message: message.to_string(),
        }),
    )
}

fn record_audit(state: &AppState, event: AuditEvent) {
    if let Err(error) = state.audit.log(&event) {
        warn!(error = %error, "failed to write audit event");
    }
}

/// Check the raw body against the `x-paystack-signature` header.
fn authenticate(
    client: &PaystackClient,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), &'static str> {
    let Some(value) = headers.get(paystack::SIGNATURE_HEADER) else {
        return Err("missing signature header");
    };
    let Ok(signature) = value.to_str() else {
        return Err("malformed signature header");
    };
    if !client.verify_webhook_signature(body, signature) {
        return Err("signature mismatch");
    }
    Ok(())
}

/// Receive a gateway event.
///
/// Unauthenticated route; authenticity comes from the HMAC body signature
/// and a mismatch is rejected before any storage access.
#[utoipa::path(
    post,
    path = "/v1/gateway/webhook",
    tag = "Webhook",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or ignored", body = WebhookAck),
        (status = 400, description = "Authentic but unparseable payload", body = WebhookAck),
        (status = 403, description = "Signature mismatch", body = WebhookAck),
        (status = 500, description = "Internal error, gateway should retry", body = WebhookAck),
        (status = 503, description = "Gateway secret not configured", body = WebhookAck)
    )
)]
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    // Without the secret nothing can be authenticated
    if !PaystackClient::is_configured() {
        return reject(
            StatusCode::SERVICE_UNAVAILABLE,
            "gateway secret not configured",
        );
    }
    let client = match PaystackClient::from_env() {
        Ok(client) => client,
        Err(error) => {
            warn!(error = %error, "webhook dropped: gateway client unavailable");
            return reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "gateway secret not configured",
            );
        }
    };

    // Authenticity first, on the raw bytes, before any parsing or storage
    if let Err(reason) = authenticate(&client, &headers, &body) {
        warn!(reason, "webhook rejected");
        record_audit(
            &state,
            AuditEvent::new(AuditEventType::WebhookRejected).failed(reason),
        );
        return reject(StatusCode::FORBIDDEN, "invalid signature");
    }

    let event = match paystack::parse_webhook_event(&body) {
        Ok(event) => event,
        Err(error) => {
            warn!(error = %error, "authentic webhook with unparseable body");
            return reject(StatusCode::BAD_REQUEST, "unparseable event payload");
        }
    };

    process_event(&state, &event)
}

/// Route an authenticated event to the ledger.
///
/// 200 for everything fully handled, including events that change nothing;
/// only an internal storage failure earns a 5xx so the gateway retries.
fn process_event(state: &AppState, event: &WebhookEvent) -> (StatusCode, Json<WebhookAck>) {
    match event.event.as_str() {
        "charge.success" => {
            let Some(reference) = event.reference() else {
                return reject(
                    StatusCode::BAD_REQUEST,
                    "charge.success without data.reference",
                );
            };
            let Some(amount) = event.amount_minor() else {
                return reject(
                    StatusCode::BAD_REQUEST,
                    "charge.success without data.amount",
                );
            };

            match state.ledger.settle_deposit(reference, amount) {
                Ok(SettleOutcome::Credited {
                    wallet_id,
                    new_balance,
                }) => {
                    info!(
                        reference,
                        wallet_id = %wallet_id,
                        amount,
                        new_balance,
                        "deposit settled"
                    );
                    record_audit(
                        state,
                        AuditEvent::new(AuditEventType::DepositSettled)
                            .with_resource("transaction", reference)
                            .with_details(json!({ "amount": amount, "wallet_id": wallet_id })),
                    );
                    ack("deposit settled")
                }
                Ok(SettleOutcome::AlreadySettled { status }) => {
                    debug!(reference, status = ?status, "duplicate settlement ignored");
                    ack("already settled")
                }
                Ok(SettleOutcome::UnknownReference) => {
                    warn!(reference, "settlement for unknown reference ignored");
                    ack("unknown reference")
                }
                Err(e) => {
                    error!(reference, error = %e, "settlement failed, gateway will retry");
                    reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                }
            }
        }
        "charge.failed" => {
            let Some(reference) = event.reference() else {
                return reject(
                    StatusCode::BAD_REQUEST,
                    "charge.failed without data.reference",
                );
            };

            match state.ledger.apply_charge_status(reference, TxStatus::Failed) {
                Ok(tx) => match tx.status {
                    TxStatus::Failed => {
                        info!(reference, "deposit marked failed");
                        record_audit(
                            state,
                            AuditEvent::new(AuditEventType::DepositFailed)
                                .with_resource("transaction", reference),
                        );
                        ack("deposit failed")
                    }
                    // A settled row stays settled; late failure events lose
                    _ => ack("already terminal"),
                },
                Err(LedgerError::TransactionNotFound(_)) => {
                    warn!(reference, "failure for unknown reference ignored");
                    ack("unknown reference")
                }
                Err(e) => {
                    error!(reference, error = %e, "failure write failed, gateway will retry");
                    reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                }
            }
        }
        other => {
            debug!(event = other, "gateway event ignored");
            ack("event ignored")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::test_state;
    use crate::storage::TxKind;
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    const TEST_GATEWAY_SECRET: &str = "sk_test_webhook";

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac =
            <Hmac<Sha512> as Mac>::new_from_slice(secret.as_bytes()).expect("mac accepts any key");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn test_client() -> PaystackClient {
        PaystackClient::new(
            "https://api.paystack.co".to_string(),
            TEST_GATEWAY_SECRET.to_string(),
        )
        .expect("client")
    }

    fn success_event(reference: &str, amount: u64) -> WebhookEvent {
        let body = format!(
            r#"{{"event":"charge.success","data":{{"reference":"{reference}","amount":{amount}}}}}"#
        );
        paystack::parse_webhook_event(body.as_bytes()).expect("parse")
    }

    fn failed_event(reference: &str) -> WebhookEvent {
        let body =
            format!(r#"{{"event":"charge.failed","data":{{"reference":"{reference}"}}}}"#);
        paystack::parse_webhook_event(body.as_bytes()).expect("parse")
    }

    #[test]
    fn authenticate_accepts_valid_signature() {
        let client = test_client();
        let body = br#"{"event":"charge.success"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            paystack::SIGNATURE_HEADER,
            sign(TEST_GATEWAY_SECRET, body).parse().unwrap(),
        );

        assert!(authenticate(&client, &headers, body).is_ok());
    }

    #[test]
    fn authenticate_rejects_missing_header() {
        let client = test_client();
        let result = authenticate(&client, &HeaderMap::new(), b"{}");
        assert_eq!(result, Err("missing signature header"));
    }

    #[test]
    fn authenticate_rejects_wrong_signature() {
        let client = test_client();
        let body = br#"{"event":"charge.success"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            paystack::SIGNATURE_HEADER,
            sign("some-other-secret", body).parse().unwrap(),
        );

        assert_eq!(
            authenticate(&client, &headers, body),
            Err("signature mismatch")
        );
    }

    #[tokio::test]
    async fn success_event_credits_exactly_once() {
        let (state, _dir) = test_state();
        let wallet = state.ledger.ensure_wallet("alice", "NGN").expect("wallet");
        state
            .ledger
            .record_pending_deposit(&wallet.id, "dep_1", 5_000)
            .expect("pending deposit");

        let event = success_event("dep_1", 5_000);

        let (status, Json(body)) = process_event(&state, &event);
        assert_eq!(status, StatusCode::OK);
        assert!(body.status);

        // Redelivery is a no-op ack
        let (status, _) = process_event(&state, &event);
        assert_eq!(status, StatusCode::OK);

        let wallet = state
            .ledger
            .wallet_by_id(&wallet.id)
            .expect("lookup")
            .expect("wallet");
        assert_eq!(wallet.balance, 5_000);
    }

    #[tokio::test]
    async fn failed_event_never_touches_the_balance() {
        let (state, _dir) = test_state();
        let wallet = state.ledger.ensure_wallet("alice", "NGN").expect("wallet");
        state
            .ledger
            .record_pending_deposit(&wallet.id, "dep_1", 5_000)
            .expect("pending deposit");

        let (status, _) = process_event(&state, &failed_event("dep_1"));
        assert_eq!(status, StatusCode::OK);

        let tx = state
            .ledger
            .transaction_by_reference("dep_1")
            .expect("lookup")
            .expect("row");
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(tx.kind, TxKind::Deposit);

        let wallet = state
            .ledger
            .wallet_by_id(&wallet.id)
            .expect("lookup")
            .expect("wallet");
        assert_eq!(wallet.balance, 0);
    }

    #[tokio::test]
    async fn late_failure_after_settlement_is_ignored() {
        let (state, _dir) = test_state();
        let wallet = state.ledger.ensure_wallet("alice", "NGN").expect("wallet");
        state
            .ledger
            .record_pending_deposit(&wallet.id, "dep_1", 5_000)
            .expect("pending deposit");
        state
            .ledger
            .settle_deposit("dep_1", 5_000)
            .expect("settle");

        let (status, _) = process_event(&state, &failed_event("dep_1"));
        assert_eq!(status, StatusCode::OK);

        let tx = state
            .ledger
            .transaction_by_reference("dep_1")
            .expect("lookup")
            .expect("row");
        assert_eq!(tx.status, TxStatus::Success);
    }

    #[tokio::test]
    async fn unknown_reference_is_acknowledged() {
        let (state, _dir) = test_state();

        let (status, Json(body)) = process_event(&state, &success_event("dep_nowhere", 1_000));
        assert_eq!(status, StatusCode::OK);
        assert!(body.status);
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged() {
        let (state, _dir) = test_state();
        let event =
            paystack::parse_webhook_event(br#"{"event":"subscription.create","data":{}}"#)
                .expect("parse");

        let (status, Json(body)) = process_event(&state, &event);
        assert_eq!(status, StatusCode::OK);
        assert!(body.status);
    }

    #[tokio::test]
    async fn success_without_amount_is_rejected() {
        let (state, _dir) = test_state();
        let event =
            paystack::parse_webhook_event(br#"{"event":"charge.success","data":{"reference":"dep_1"}}"#)
                .expect("parse");

        let (status, Json(body)) = process_event(&state, &event);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.status);
    }

    #[tokio::test]
    async fn handler_without_gateway_secret_returns_503() {
        // No PAYSTACK_SECRET_KEY in the test environment
        let (state, _dir) = test_state();

        let (status, _) =
            paystack_webhook(State(state), HeaderMap::new(), Bytes::from_static(b"{}")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
