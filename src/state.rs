// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state handed to every handler.

use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use crate::config::Settings;
use crate::storage::{AuditLog, LedgerDb};

/// JWT verification material derived from the shared secret at startup.
#[derive(Clone)]
pub struct AuthKeys {
    pub decoding: Arc<DecodingKey>,
}

impl AuthKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerDb>,
    pub settings: Arc<Settings>,
    pub audit: Arc<AuditLog>,
    pub auth: AuthKeys,
}

impl AppState {
    pub fn new(ledger: LedgerDb, settings: Settings, audit: AuditLog) -> Self {
        let auth = AuthKeys::from_secret(settings.jwt_secret.as_bytes());
        Self {
            ledger: Arc::new(ledger),
            settings: Arc::new(settings),
            audit: Arc::new(audit),
            auth,
        }
    }
}
