// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state for the wallet service lives under `DATA_DIR`:
//!
//! ```text
//! /data/
//!   ledger.redb          # Embedded ACID ledger (wallets + transactions)
//!   audit/
//!     events-{date}.jsonl  # Daily audit logs
//! ```
//!
//! The ledger is the only shared mutable resource in the process. Every
//! balance-affecting operation is one redb write transaction; see
//! [`ledger::LedgerDb`] for the atomic units and their guarantees.

pub mod audit;
pub mod ledger;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use ledger::{
    LedgerDb, LedgerError, LedgerResult, LedgerTransaction, SettleOutcome, TransferReceipt,
    TxKind, TxStatus, Wallet,
};

/// File name of the redb ledger inside the data directory.
pub const LEDGER_DB_FILE: &str = "ledger.redb";
