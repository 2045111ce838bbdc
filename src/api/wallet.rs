// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet balance and transaction history endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    audit_log,
    auth::{Ability, Auth, AuthenticatedUser},
    error::ApiError,
    state::AppState,
    storage::{AuditEventType, LedgerTransaction, TxKind, TxStatus, Wallet},
};

use super::{map_ledger_error, require_ability};

/// Wallet balance returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Wallet ID.
    pub wallet_id: String,
    /// Balance in integer minor units.
    pub balance: u64,
    /// ISO currency code.
    pub currency: String,
}

/// Ledger transaction returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    /// Transaction ID.
    pub id: String,
    /// Globally unique reference (idempotency key).
    pub reference: String,
    /// `deposit`, `transfer_out` or `transfer_in`.
    pub kind: TxKind,
    /// Amount in integer minor units.
    pub amount: u64,
    /// `pending`, `success` or `failed`.
    pub status: TxStatus,
    /// Wallet this row belongs to.
    pub wallet_id: String,
    /// Other wallet of a transfer pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_wallet_id: Option<String>,
    /// Creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}

/// List response for transaction history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// Newest-first transactions for the caller's wallet.
    pub transactions: Vec<TransactionView>,
    /// Total count.
    pub total: usize,
}

pub(super) fn to_view(record: &LedgerTransaction) -> TransactionView {
    TransactionView {
        id: record.id.clone(),
        reference: record.reference.clone(),
        kind: record.kind,
        amount: record.amount,
        status: record.status,
        wallet_id: record.wallet_id.clone(),
        counterparty_wallet_id: record.counterparty_wallet_id.clone(),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

/// Fetch the caller's wallet, creating it on first contact.
///
/// The existence pre-check is advisory and only decides whether to emit the
/// `wallet_created` audit event; the get-or-create itself is atomic inside
/// the ledger.
pub(super) fn ensure_caller_wallet(
    state: &AppState,
    user: &AuthenticatedUser,
) -> Result<Wallet, ApiError> {
    let existed = state
        .ledger
        .wallet_for_user(&user.user_id)
        .map_err(map_ledger_error)?
        .is_some();

    let wallet = state
        .ledger
        .ensure_wallet(&user.user_id, &state.settings.currency)
        .map_err(map_ledger_error)?;

    if !existed {
        audit_log!(
            &state.audit,
            AuditEventType::WalletCreated,
            user,
            "wallet",
            &wallet.id
        );
    }

    Ok(wallet)
}

/// Get the caller's current balance.
#[utoipa::path(
    get,
    path = "/v1/wallet/balance",
    tag = "Wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_balance(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    require_ability(&state, &user, Ability::Read)?;

    let wallet = ensure_caller_wallet(&state, &user)?;
    Ok(Json(BalanceResponse {
        wallet_id: wallet.id,
        balance: wallet.balance,
        currency: wallet.currency,
    }))
}

/// List the caller's transactions, newest first.
#[utoipa::path(
    get,
    path = "/v1/wallet/transactions",
    tag = "Wallet",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction history", body = TransactionListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_transactions(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    require_ability(&state, &user, Ability::Read)?;

    let wallet = ensure_caller_wallet(&state, &user)?;
    let records = state
        .ledger
        .transactions_for_wallet(&wallet.id)
        .map_err(map_ledger_error)?;

    let transactions: Vec<TransactionView> = records.iter().map(to_view).collect();
    Ok(Json(TransactionListResponse {
        total: transactions.len(),
        transactions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{restricted_user, test_state, test_user};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn balance_creates_wallet_lazily() {
        let (state, _dir) = test_state();
        let user = test_user("user_1");

        let Json(body) = get_balance(Auth(user), State(state.clone()))
            .await
            .expect("balance should succeed");
        assert_eq!(body.balance, 0);
        assert_eq!(body.currency, "NGN");

        let wallet = state
            .ledger
            .wallet_for_user("user_1")
            .expect("lookup")
            .expect("wallet should now exist");
        assert_eq!(wallet.id, body.wallet_id);
    }

    #[tokio::test]
    async fn balance_requires_read_ability() {
        let (state, _dir) = test_state();
        let user = restricted_user("user_1", vec![Ability::Deposit]);

        let error = get_balance(Auth(user), State(state))
            .await
            .expect_err("missing read ability should fail");
        assert_eq!(error.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn history_is_empty_for_new_wallet() {
        let (state, _dir) = test_state();
        let user = test_user("user_1");

        let Json(body) = list_transactions(Auth(user), State(state))
            .await
            .expect("history should succeed");
        assert_eq!(body.total, 0);
        assert!(body.transactions.is_empty());
    }

    #[tokio::test]
    async fn history_returns_newest_first() {
        let (state, _dir) = test_state();
        let user = test_user("user_1");
        let wallet = ensure_caller_wallet(&state, &user).expect("wallet");

        state
            .ledger
            .record_pending_deposit(&wallet.id, "dep_older", 1_000)
            .expect("older deposit");
        std::thread::sleep(std::time::Duration::from_millis(2));
        state
            .ledger
            .record_pending_deposit(&wallet.id, "dep_newer", 2_000)
            .expect("newer deposit");

        let Json(body) = list_transactions(Auth(user), State(state))
            .await
            .expect("history should succeed");
        assert_eq!(body.total, 2);
        assert_eq!(body.transactions[0].reference, "dep_newer");
        assert_eq!(body.transactions[1].reference, "dep_older");
    }
}
