// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Ledger - Custodial Fiat Wallet Service
//!
//! This crate provides a custodial wallet and payment reconciliation
//! service: deposits enter through a hosted payment gateway (Paystack) and
//! are settled by signed webhooks against an embedded ACID ledger (redb);
//! funds move between wallets through atomic paired-leg transfers.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Authentication and authorization (HS256 JWT)
//! - `providers` - Payment gateway clients (Paystack)
//! - `storage` - Embedded ledger and audit trail (redb + JSONL)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod providers;
pub mod state;
pub mod storage;
