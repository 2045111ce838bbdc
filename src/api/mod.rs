// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP API surface: routing, shared error mapping, OpenAPI document.

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{Ability, AuthenticatedUser},
    error::ApiError,
    state::AppState,
    storage::{AuditEvent, AuditEventType, LedgerError},
};

pub mod deposits;
pub mod health;
pub mod transfers;
pub mod wallet;
pub mod webhook;

/// Map ledger failures onto the API error taxonomy.
pub(crate) fn map_ledger_error(error: LedgerError) -> ApiError {
    match error {
        LedgerError::WalletNotFound(_) | LedgerError::TransactionNotFound(_) => {
            ApiError::not_found(error.to_string())
        }
        LedgerError::InsufficientFunds { .. } => ApiError::forbidden(error.to_string()),
        LedgerError::SelfTransfer(_) => ApiError::bad_request(error.to_string()),
        LedgerError::DuplicateReference(_) => ApiError::new(StatusCode::CONFLICT, error.to_string()),
        LedgerError::BalanceOverflow(_)
        | LedgerError::Redb(_)
        | LedgerError::RedbDatabase(_)
        | LedgerError::RedbTransaction(_)
        | LedgerError::RedbTable(_)
        | LedgerError::RedbStorage(_)
        | LedgerError::RedbCommit(_)
        | LedgerError::Serde(_) => ApiError::internal(error.to_string()),
    }
}

/// Ability gate shared by the wallet handlers. Denials are audited.
pub(crate) fn require_ability(
    state: &AppState,
    user: &AuthenticatedUser,
    ability: Ability,
) -> Result<(), ApiError> {
    if let Err(denied) = user.require(ability) {
        let event = AuditEvent::new(AuditEventType::PermissionDenied)
            .with_user(&user.user_id)
            .failed(format!("ability `{ability}` not granted"));
        if let Err(error) = state.audit.log(&event) {
            warn!(error = %error, "failed to write audit event");
        }
        return Err(denied.into());
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/wallet/deposits", post(deposits::initiate_deposit))
        .route("/wallet/deposits/{reference}", get(deposits::get_deposit))
        .route(
            "/wallet/deposits/{reference}/verify",
            post(deposits::verify_deposit),
        )
        .route("/wallet/transfers", post(transfers::create_transfer))
        .route("/wallet/balance", get(wallet::get_balance))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/gateway/webhook", post(webhook::paystack_webhook));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bearer JWT security scheme for the OpenAPI document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        deposits::initiate_deposit,
        deposits::get_deposit,
        deposits::verify_deposit,
        transfers::create_transfer,
        wallet::get_balance,
        wallet::list_transactions,
        webhook::paystack_webhook,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            deposits::DepositRequest,
            deposits::DepositResponse,
            transfers::TransferRequest,
            transfers::TransferResponse,
            wallet::BalanceResponse,
            wallet::TransactionView,
            wallet::TransactionListResponse,
            webhook::WebhookAck,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            crate::storage::TxKind,
            crate::storage::TxStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Deposits", description = "Gateway deposit initiation and verification"),
        (name = "Transfers", description = "Wallet-to-wallet transfers"),
        (name = "Wallet", description = "Balance and transaction history"),
        (name = "Webhook", description = "Gateway event reconciliation"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
