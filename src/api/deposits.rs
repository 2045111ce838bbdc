// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway deposit initiation, lookup and verification.
//!
//! Initiation is gateway-first: the charge is created with the gateway
//! before any row is persisted, so a rejected or unreachable gateway leaves
//! no trace behind. The wallet credit itself happens only on the webhook
//! path; the explicit verify endpoint writes status back but never credits.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit_log,
    auth::{Ability, Auth, AuthenticatedUser},
    error::ApiError,
    providers::paystack::{ChargeStatus, CreateChargeRequest, PaystackClient, PaystackError},
    state::AppState,
    storage::{AuditEventType, LedgerTransaction, TxKind, TxStatus},
};

use super::{
    map_ledger_error, require_ability,
    wallet::{ensure_caller_wallet, to_view, TransactionView},
};

/// Request body for initiating a deposit.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DepositRequest {
    /// Amount in integer minor units (kobo for NGN).
    pub amount: u64,
}

/// Response for an initiated deposit.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepositResponse {
    /// Unique charge reference (`dep_<uuid>`); webhook events echo this.
    pub reference: String,
    /// Hosted payment page to redirect the payer to.
    pub authorization_url: String,
    /// Amount in integer minor units.
    pub amount: u64,
}

fn map_gateway_error(error: PaystackError) -> ApiError {
    match error {
        PaystackError::MissingConfig(message) => {
            ApiError::service_unavailable(format!("Paystack configuration error: {message}"))
        }
        PaystackError::Request(message) | PaystackError::InvalidResponse(message) => {
            ApiError::service_unavailable(format!("Paystack request failed: {message}"))
        }
    }
}

/// Load a deposit row by reference and check the caller owns it.
fn load_owned_deposit(
    state: &AppState,
    user: &AuthenticatedUser,
    reference: &str,
) -> Result<LedgerTransaction, ApiError> {
    let tx = state
        .ledger
        .transaction_by_reference(reference)
        .map_err(map_ledger_error)?
        .ok_or_else(|| ApiError::not_found("Deposit not found"))?;

    // Transfer legs share the reference namespace but are not deposits
    if tx.kind != TxKind::Deposit {
        return Err(ApiError::not_found("Deposit not found"));
    }

    let wallet = state
        .ledger
        .wallet_by_id(&tx.wallet_id)
        .map_err(map_ledger_error)?
        .ok_or_else(|| ApiError::internal("Wallet missing for transaction"))?;
    if wallet.owner_user_id != user.user_id {
        return Err(ApiError::forbidden(
            "You do not have permission to access this deposit",
        ));
    }

    Ok(tx)
}

/// Initiate a deposit through the payment gateway.
#[utoipa::path(
    post,
    path = "/v1/wallet/deposits",
    tag = "Deposits",
    request_body = DepositRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Deposit initiated", body = DepositResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 503, description = "Gateway unavailable")
    )
)]
pub async fn initiate_deposit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>), ApiError> {
    require_ability(&state, &user, Ability::Deposit)?;

    let minimum = state.settings.min_deposit_minor;
    if request.amount < minimum {
        return Err(ApiError::bad_request(format!(
            "amount must be at least {minimum} minor units"
        )));
    }

    let wallet = ensure_caller_wallet(&state, &user)?;

    if !PaystackClient::is_configured() {
        return Err(ApiError::service_unavailable(
            "Paystack is not configured. Set PAYSTACK_SECRET_KEY.",
        ));
    }
    let Some(callback_url) = state.settings.public_base_url.as_ref() else {
        return Err(ApiError::service_unavailable(
            "PUBLIC_BASE_URL is not configured; deposits need a callback URL.",
        ));
    };

    let client = PaystackClient::from_env().map_err(map_gateway_error)?;
    let reference = format!("dep_{}", Uuid::new_v4());
    let session = client
        .create_charge(CreateChargeRequest {
            reference: &reference,
            amount_minor: request.amount,
            currency: &state.settings.currency,
            payer_email: &user.email,
            callback_url: callback_url.as_str(),
        })
        .await
        .map_err(map_gateway_error)?;

    // Persist under the reference the gateway echoed back; webhook events
    // carry that exact string.
    let row = state
        .ledger
        .record_pending_deposit(&wallet.id, &session.reference, request.amount)
        .map_err(map_ledger_error)?;

    audit_log!(
        &state.audit,
        AuditEventType::DepositInitiated,
        &user,
        "transaction",
        &row.reference
    );
    info!(
        wallet_id = %wallet.id,
        reference = %row.reference,
        amount = row.amount,
        "deposit initiated"
    );

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            reference: row.reference,
            authorization_url: session.authorization_url,
            amount: row.amount,
        }),
    ))
}

/// Get a deposit by reference.
#[utoipa::path(
    get,
    path = "/v1/wallet/deposits/{reference}",
    tag = "Deposits",
    params(
        ("reference" = String, Path, description = "Deposit reference")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deposit details", body = TransactionView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_deposit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    require_ability(&state, &user, Ability::Read)?;

    let tx = load_owned_deposit(&state, &user, &reference)?;
    Ok(Json(to_view(&tx)))
}

/// Re-query the gateway for a deposit's authoritative status.
///
/// Writes the reported status back onto a still-pending row. Never credits
/// the wallet; the webhook remains the sole crediting path.
#[utoipa::path(
    post,
    path = "/v1/wallet/deposits/{reference}/verify",
    tag = "Deposits",
    params(
        ("reference" = String, Path, description = "Deposit reference")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Deposit after verification", body = TransactionView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 503, description = "Gateway unavailable")
    )
)]
pub async fn verify_deposit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    require_ability(&state, &user, Ability::Read)?;

    let tx = load_owned_deposit(&state, &user, &reference)?;
    // A settled or failed row is already authoritative; skip the gateway
    if tx.status.is_terminal() {
        return Ok(Json(to_view(&tx)));
    }

    if !PaystackClient::is_configured() {
        return Err(ApiError::service_unavailable(
            "Paystack is not configured. Set PAYSTACK_SECRET_KEY.",
        ));
    }
    let client = PaystackClient::from_env().map_err(map_gateway_error)?;
    let verification = client
        .verify_charge(&reference)
        .await
        .map_err(map_gateway_error)?;

    let status = match verification.status {
        ChargeStatus::Success => TxStatus::Success,
        ChargeStatus::Failed => TxStatus::Failed,
        ChargeStatus::Pending => TxStatus::Pending,
    };
    let updated = state
        .ledger
        .apply_charge_status(&reference, status)
        .map_err(map_ledger_error)?;

    if updated.status.is_terminal() {
        audit_log!(
            &state.audit,
            AuditEventType::DepositVerified,
            &user,
            "transaction",
            &updated.reference
        );
    }
    info!(
        reference = %reference,
        gateway_status = %verification.raw_status,
        "deposit verification write-back"
    );

    Ok(Json(to_view(&updated)))
}
