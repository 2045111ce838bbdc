// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet-to-wallet transfers.
//!
//! A transfer debits the sender and credits the recipient in one atomic
//! ledger write that also records a `transfer_out`/`transfer_in` leg pair
//! sharing a `trf_<uuid>` correlation reference.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit_log,
    auth::{Ability, Auth},
    error::ApiError,
    state::AppState,
    storage::AuditEventType,
};

use super::{map_ledger_error, require_ability, wallet::ensure_caller_wallet};

/// Request body for wallet-to-wallet transfers.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// Destination wallet ID.
    pub recipient_wallet_id: String,
    /// Amount in integer minor units.
    pub amount: u64,
}

/// Receipt returned after a completed transfer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResponse {
    /// Correlation reference shared by both legs (`trf_<uuid>`).
    pub reference: String,
    /// Amount moved, in integer minor units.
    pub amount: u64,
    /// Sender balance after the debit.
    pub sender_balance: u64,
}

/// Transfer funds to another wallet.
#[utoipa::path(
    post,
    path = "/v1/wallet/transfers",
    tag = "Transfers",
    request_body = TransferRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Transfer executed", body = TransferResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden or insufficient funds"),
        (status = 404, description = "Recipient wallet not found")
    )
)]
pub async fn create_transfer(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    require_ability(&state, &user, Ability::Transfer)?;

    if request.amount == 0 {
        return Err(ApiError::bad_request(
            "amount must be a positive number of minor units",
        ));
    }

    let sender = ensure_caller_wallet(&state, &user)?;

    // Advisory pre-checks for friendly errors; the ledger re-validates
    // everything inside the write transaction.
    let recipient = state
        .ledger
        .wallet_by_id(&request.recipient_wallet_id)
        .map_err(map_ledger_error)?
        .ok_or_else(|| ApiError::not_found("Recipient wallet not found"))?;
    if recipient.id == sender.id {
        return Err(ApiError::bad_request("Cannot transfer to your own wallet"));
    }
    if sender.balance < request.amount {
        return Err(ApiError::forbidden("Insufficient funds"));
    }

    let correlation = format!("trf_{}", Uuid::new_v4());
    let receipt = state
        .ledger
        .apply_transfer(&sender.id, &recipient.id, request.amount, &correlation)
        .map_err(map_ledger_error)?;

    audit_log!(
        &state.audit,
        AuditEventType::TransferExecuted,
        &user,
        "transfer",
        &receipt.reference
    );
    info!(
        sender_wallet = %sender.id,
        recipient_wallet = %recipient.id,
        amount = receipt.amount,
        reference = %receipt.reference,
        "transfer executed"
    );

    Ok((
        StatusCode::CREATED,
        Json(TransferResponse {
            reference: receipt.reference,
            amount: receipt.amount,
            sender_balance: receipt.sender_balance,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{restricted_user, test_state, test_user};
    use crate::state::AppState;
    use crate::storage::SettleOutcome;

    /// Create a wallet for the user and credit it through the deposit path.
    fn funded_wallet(state: &AppState, user_id: &str, balance: u64) -> String {
        let wallet = state.ledger.ensure_wallet(user_id, "NGN").expect("wallet");
        let reference = format!("dep_seed_{user_id}");
        state
            .ledger
            .record_pending_deposit(&wallet.id, &reference, balance)
            .expect("pending deposit");
        let outcome = state
            .ledger
            .settle_deposit(&reference, balance)
            .expect("settle");
        assert!(matches!(outcome, SettleOutcome::Credited { .. }));
        wallet.id
    }

    #[tokio::test]
    async fn transfer_moves_funds_between_wallets() {
        let (state, _dir) = test_state();
        let alice = test_user("alice");
        funded_wallet(&state, "alice", 5_000);
        let bob_wallet = funded_wallet(&state, "bob", 0);

        let (status, Json(receipt)) = create_transfer(
            Auth(alice),
            State(state.clone()),
            Json(TransferRequest {
                recipient_wallet_id: bob_wallet.clone(),
                amount: 1_000,
            }),
        )
        .await
        .expect("transfer should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt.amount, 1_000);
        assert_eq!(receipt.sender_balance, 4_000);
        assert!(receipt.reference.starts_with("trf_"));

        let bob = state
            .ledger
            .wallet_by_id(&bob_wallet)
            .expect("lookup")
            .expect("bob wallet");
        assert_eq!(bob.balance, 1_000);
    }

    #[tokio::test]
    async fn transfer_rejects_zero_amount() {
        let (state, _dir) = test_state();
        let alice = test_user("alice");
        let bob_wallet = funded_wallet(&state, "bob", 0);

        let error = create_transfer(
            Auth(alice),
            State(state),
            Json(TransferRequest {
                recipient_wallet_id: bob_wallet,
                amount: 0,
            }),
        )
        .await
        .expect_err("zero amount should fail");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transfer_rejects_unknown_recipient() {
        let (state, _dir) = test_state();
        let alice = test_user("alice");
        funded_wallet(&state, "alice", 5_000);

        let error = create_transfer(
            Auth(alice),
            State(state),
            Json(TransferRequest {
                recipient_wallet_id: "missing-wallet".to_string(),
                amount: 100,
            }),
        )
        .await
        .expect_err("unknown recipient should fail");
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transfer_rejects_own_wallet() {
        let (state, _dir) = test_state();
        let alice = test_user("alice");
        let alice_wallet = funded_wallet(&state, "alice", 5_000);

        let error = create_transfer(
            Auth(alice),
            State(state),
            Json(TransferRequest {
                recipient_wallet_id: alice_wallet,
                amount: 100,
            }),
        )
        .await
        .expect_err("self transfer should fail");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_funds() {
        let (state, _dir) = test_state();
        let alice = test_user("alice");
        funded_wallet(&state, "alice", 500);
        let bob_wallet = funded_wallet(&state, "bob", 0);

        let error = create_transfer(
            Auth(alice),
            State(state),
            Json(TransferRequest {
                recipient_wallet_id: bob_wallet,
                amount: 1_000,
            }),
        )
        .await
        .expect_err("insufficient funds should fail");
        assert_eq!(error.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn transfer_requires_transfer_ability() {
        let (state, _dir) = test_state();
        let alice = restricted_user("alice", vec![Ability::Read]);
        let bob_wallet = funded_wallet(&state, "bob", 0);

        let error = create_transfer(
            Auth(alice),
            State(state),
            Json(TransferRequest {
                recipient_wallet_id: bob_wallet,
                amount: 100,
            }),
        )
        .await
        .expect_err("missing transfer ability should fail");
        assert_eq!(error.status, StatusCode::FORBIDDEN);
    }
}
