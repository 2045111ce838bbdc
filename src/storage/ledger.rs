// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded wallet ledger backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `wallets`: wallet_id → serialized Wallet (JSON bytes)
//! - `user_wallets`: owner_user_id → wallet_id (1:1 user↔wallet)
//! - `transactions`: reference → serialized LedgerTransaction (JSON bytes)
//! - `wallet_txs`: composite key (wallet_id|!timestamp|reference) → kind
//!
//! Every balance-affecting operation below is one redb write transaction.
//! redb admits a single writer at a time, so these units serialize: a
//! duplicate settlement delivered concurrently always observes the first
//! delivery's committed state and lands in the no-op branch. Balances are
//! only ever changed in the same write transaction that records the
//! corresponding ledger row, so a commit either applies both or neither.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary wallet table: wallet_id → serialized Wallet (JSON bytes).
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Ownership map: owner_user_id → wallet_id. One wallet per user.
const USER_WALLETS: TableDefinition<&str, &str> = TableDefinition::new("user_wallets");

/// Primary ledger table: reference → serialized LedgerTransaction.
/// The reference is the idempotency key for all gateway-sourced updates,
/// so it doubles as the primary key; global uniqueness comes for free.
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Index: composite key → transaction kind.
/// Key format: `wallet_id|!timestamp_micros_be|reference` for
/// descending-time range scans.
const WALLET_TXS: TableDefinition<&[u8], &str> = TableDefinition::new("wallet_txs");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("balance overflow on wallet {0}")]
    BalanceOverflow(String),

    #[error("transfer to own wallet {0}")]
    SelfTransfer(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    TransferOut,
    TransferIn,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::TransferOut => "transfer_out",
            TxKind::TransferIn => "transfer_in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    /// Terminal statuses are never left again; `pending` is the only state
    /// that admits a transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub owner_user_id: String,
    /// Balance in integer minor units. Never negative by construction:
    /// debits are checked against it inside the same write transaction.
    pub balance: u64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    fn new(owner_user_id: &str, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.to_string(),
            balance: 0,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    /// Globally unique. For deposits this is the gateway charge reference;
    /// for transfer legs it is `<correlation>.out` / `<correlation>.in`.
    pub reference: String,
    pub kind: TxKind,
    /// Positive amount in integer minor units. For deposits, updated to the
    /// gateway-reported figure at settlement so the ledger sums to the
    /// balance even when the gateway settles a different amount.
    pub amount: u64,
    pub status: TxStatus,
    pub wallet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_wallet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new_pending_deposit(wallet_id: &str, reference: &str, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            reference: reference.to_string(),
            kind: TxKind::Deposit,
            amount,
            status: TxStatus::Pending,
            wallet_id: wallet_id.to_string(),
            counterparty_wallet_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transfer legs are born `success`: transfers are internal and settle
    /// in the same write transaction that creates them.
    fn new_transfer_leg(
        kind: TxKind,
        wallet_id: &str,
        counterparty_wallet_id: &str,
        reference: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reference: reference.to_string(),
            kind,
            amount,
            status: TxStatus::Success,
            wallet_id: wallet_id.to_string(),
            counterparty_wallet_id: Some(counterparty_wallet_id.to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of applying a `charge.success` settlement to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The row moved `pending → success` and the wallet was credited.
    Credited { wallet_id: String, new_balance: u64 },
    /// The row was already terminal: duplicate or late delivery, no-op.
    AlreadySettled { status: TxStatus },
    /// No transaction carries this reference; nothing to reconcile.
    UnknownReference,
}

/// Returned by [`LedgerDb::apply_transfer`] on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// The correlation reference shared by both legs.
    pub reference: String,
    pub amount: u64,
    pub sender_balance: u64,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the wallet_txs table.
///
/// Format: `wallet_id | inverted_timestamp_micros_be | reference`
///
/// The inverted timestamp ensures newest-first ordering when scanning
/// forward; microsecond resolution keeps rows created in the same second in
/// insertion order.
fn make_index_key(wallet_id: &str, timestamp_micros: i64, reference: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(wallet_id.len() + 1 + 8 + 1 + reference.len());
    key.extend_from_slice(wallet_id.as_bytes());
    key.push(b'|');
    // Invert timestamp for descending order (newest first)
    key.extend_from_slice(&(!timestamp_micros as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(reference.as_bytes());
    key
}

/// Build a prefix key for range scanning all transactions of a wallet.
fn make_prefix(wallet_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(wallet_id.len() + 1);
    prefix.extend_from_slice(wallet_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
fn make_prefix_end(wallet_id: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(wallet_id.len() + 1 + 20);
    end.extend_from_slice(wallet_id.as_bytes());
    end.push(b'|');
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Extract the reference portion from a composite index key.
///
/// Key format: `wallet_id|timestamp_bytes|reference`. The timestamp bytes
/// may themselves contain `|`, so split on the first separator and skip the
/// fixed-width timestamp instead of counting separators.
fn extract_reference_from_key(key: &[u8]) -> Option<String> {
    let first_pipe = key.iter().position(|&b| b == b'|')?;
    // first_pipe + 1 (separator) + 8 (timestamp) + 1 (separator)
    let reference_start = first_pipe + 10;
    if reference_start >= key.len() {
        return None;
    }
    String::from_utf8(key[reference_start..].to_vec()).ok()
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID wallet ledger.
///
/// Shared across request handlers behind an `Arc`; all methods take `&self`
/// and are safe to call concurrently. Writers serialize inside redb.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(USER_WALLETS)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(WALLET_TXS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap readiness probe: one read transaction against the wallets table.
    pub fn ping(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(WALLETS)?;
        Ok(())
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Fetch the caller's wallet, creating it on first contact.
    ///
    /// Registration and sign-in live outside this service, so "wallet
    /// created at first login" is realized here as an idempotent
    /// get-or-create: the mapping and the wallet row are written in the same
    /// transaction, and a concurrent first contact for the same user
    /// serializes on the write lock and finds the mapping present.
    pub fn ensure_wallet(&self, owner_user_id: &str, currency: &str) -> LedgerResult<Wallet> {
        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut user_table = write_txn.open_table(USER_WALLETS)?;
            let mut wallet_table = write_txn.open_table(WALLETS)?;

            let existing_id = user_table.get(owner_user_id)?.map(|v| v.value().to_string());
            match existing_id {
                Some(wallet_id) => {
                    let bytes = wallet_table
                        .get(wallet_id.as_str())?
                        .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.clone()))?
                        .value()
                        .to_vec();
                    serde_json::from_slice(&bytes)?
                }
                None => {
                    let wallet = Wallet::new(owner_user_id, currency);
                    let json = serde_json::to_vec(&wallet)?;
                    wallet_table.insert(wallet.id.as_str(), json.as_slice())?;
                    user_table.insert(owner_user_id, wallet.id.as_str())?;
                    wallet
                }
            }
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    /// Look up a wallet by id.
    pub fn wallet_by_id(&self, wallet_id: &str) -> LedgerResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(wallet_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up the wallet owned by a user, if one was ever created.
    pub fn wallet_for_user(&self, owner_user_id: &str) -> LedgerResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let user_table = read_txn.open_table(USER_WALLETS)?;
        let wallet_id = match user_table.get(owner_user_id)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let wallet_table = read_txn.open_table(WALLETS)?;
        match wallet_table.get(wallet_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Persist the `pending` row for a deposit whose charge the gateway has
    /// already accepted. Called only after charge creation succeeded, so an
    /// aborted gateway call leaves no orphaned row behind.
    pub fn record_pending_deposit(
        &self,
        wallet_id: &str,
        reference: &str,
        amount: u64,
    ) -> LedgerResult<LedgerTransaction> {
        let write_txn = self.db.begin_write()?;
        let tx = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let wallet_table = write_txn.open_table(WALLETS)?;

            if wallet_table.get(wallet_id)?.is_none() {
                return Err(LedgerError::WalletNotFound(wallet_id.to_string()));
            }
            if tx_table.get(reference)?.is_some() {
                return Err(LedgerError::DuplicateReference(reference.to_string()));
            }

            let tx = LedgerTransaction::new_pending_deposit(wallet_id, reference, amount);
            let json = serde_json::to_vec(&tx)?;
            tx_table.insert(reference, json.as_slice())?;

            let mut idx_table = write_txn.open_table(WALLET_TXS)?;
            let key = make_index_key(wallet_id, tx.created_at.timestamp_micros(), reference);
            idx_table.insert(key.as_slice(), tx.kind.as_str())?;
            tx
        };
        write_txn.commit()?;
        Ok(tx)
    }

    /// Settle a `charge.success` event: flip the row `pending → success`
    /// and credit the owning wallet, in one write transaction.
    ///
    /// This is the only code path that credits deposits. The row is looked
    /// up by reference; anything other than a live `pending` row is a
    /// no-op so redelivered and late events can never credit twice. The
    /// status write and the balance write commit together or not at all;
    /// an error return means nothing was applied.
    pub fn settle_deposit(&self, reference: &str, amount: u64) -> LedgerResult<SettleOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;

            let existing_bytes = match tx_table.get(reference)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(SettleOutcome::UnknownReference),
            };
            let mut tx: LedgerTransaction = serde_json::from_slice(&existing_bytes)?;

            if tx.status.is_terminal() {
                return Ok(SettleOutcome::AlreadySettled { status: tx.status });
            }

            // Transaction row first, wallet row second.
            tx.status = TxStatus::Success;
            tx.amount = amount;
            tx.updated_at = Utc::now();
            let tx_json = serde_json::to_vec(&tx)?;
            tx_table.insert(reference, tx_json.as_slice())?;

            let mut wallet_table = write_txn.open_table(WALLETS)?;
            let wallet_bytes = wallet_table
                .get(tx.wallet_id.as_str())?
                .ok_or_else(|| LedgerError::WalletNotFound(tx.wallet_id.clone()))?
                .value()
                .to_vec();
            let mut wallet: Wallet = serde_json::from_slice(&wallet_bytes)?;
            wallet.balance = wallet
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::BalanceOverflow(wallet.id.clone()))?;
            wallet.updated_at = tx.updated_at;
            let wallet_json = serde_json::to_vec(&wallet)?;
            wallet_table.insert(wallet.id.as_str(), wallet_json.as_slice())?;

            SettleOutcome::Credited {
                wallet_id: wallet.id,
                new_balance: wallet.balance,
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Write a gateway-reported status onto a transaction row without
    /// touching any balance.
    ///
    /// Used for `charge.failed` events and for explicit verification
    /// re-queries. Only a `pending` row transitions; terminal rows are
    /// returned unchanged (benign idempotent outcome), and a reported
    /// `pending` records nothing. Crediting stays exclusive to
    /// [`Self::settle_deposit`].
    pub fn apply_charge_status(
        &self,
        reference: &str,
        status: TxStatus,
    ) -> LedgerResult<LedgerTransaction> {
        let write_txn = self.db.begin_write()?;
        let tx = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;

            let existing_bytes = tx_table
                .get(reference)?
                .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?
                .value()
                .to_vec();
            let mut tx: LedgerTransaction = serde_json::from_slice(&existing_bytes)?;

            if tx.status.is_terminal() || !status.is_terminal() {
                return Ok(tx);
            }

            tx.status = status;
            tx.updated_at = Utc::now();
            let json = serde_json::to_vec(&tx)?;
            tx_table.insert(reference, json.as_slice())?;
            tx
        };
        write_txn.commit()?;
        Ok(tx)
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Move `amount` between two wallets as one atomic, paired ledger write.
    ///
    /// The caller's balance pre-check is advisory only; funds are
    /// re-validated here against the state visible inside the write
    /// transaction, which closes the double-spend race between two
    /// concurrent transfers that both passed the pre-check. Four writes
    /// (two wallets, two rows) commit together or not at all.
    pub fn apply_transfer(
        &self,
        sender_wallet_id: &str,
        recipient_wallet_id: &str,
        amount: u64,
        correlation: &str,
    ) -> LedgerResult<TransferReceipt> {
        if sender_wallet_id == recipient_wallet_id {
            return Err(LedgerError::SelfTransfer(sender_wallet_id.to_string()));
        }
        let out_reference = format!("{correlation}.out");
        let in_reference = format!("{correlation}.in");

        let write_txn = self.db.begin_write()?;
        let receipt = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            let mut wallet_table = write_txn.open_table(WALLETS)?;

            if tx_table.get(out_reference.as_str())?.is_some()
                || tx_table.get(in_reference.as_str())?.is_some()
            {
                return Err(LedgerError::DuplicateReference(correlation.to_string()));
            }

            let sender_bytes = wallet_table
                .get(sender_wallet_id)?
                .ok_or_else(|| LedgerError::WalletNotFound(sender_wallet_id.to_string()))?
                .value()
                .to_vec();
            let recipient_bytes = wallet_table
                .get(recipient_wallet_id)?
                .ok_or_else(|| LedgerError::WalletNotFound(recipient_wallet_id.to_string()))?
                .value()
                .to_vec();
            let mut sender: Wallet = serde_json::from_slice(&sender_bytes)?;
            let mut recipient: Wallet = serde_json::from_slice(&recipient_bytes)?;

            let sender_balance =
                sender
                    .balance
                    .checked_sub(amount)
                    .ok_or(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: sender.balance,
                    })?;
            let recipient_balance = recipient
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::BalanceOverflow(recipient.id.clone()))?;

            let now = Utc::now();
            let out_leg = LedgerTransaction::new_transfer_leg(
                TxKind::TransferOut,
                sender_wallet_id,
                recipient_wallet_id,
                &out_reference,
                amount,
                now,
            );
            let in_leg = LedgerTransaction::new_transfer_leg(
                TxKind::TransferIn,
                recipient_wallet_id,
                sender_wallet_id,
                &in_reference,
                amount,
                now,
            );
            tx_table.insert(out_reference.as_str(), serde_json::to_vec(&out_leg)?.as_slice())?;
            tx_table.insert(in_reference.as_str(), serde_json::to_vec(&in_leg)?.as_slice())?;

            sender.balance = sender_balance;
            sender.updated_at = now;
            recipient.balance = recipient_balance;
            recipient.updated_at = now;
            wallet_table.insert(sender.id.as_str(), serde_json::to_vec(&sender)?.as_slice())?;
            wallet_table.insert(
                recipient.id.as_str(),
                serde_json::to_vec(&recipient)?.as_slice(),
            )?;

            let mut idx_table = write_txn.open_table(WALLET_TXS)?;
            let micros = now.timestamp_micros();
            idx_table.insert(
                make_index_key(sender_wallet_id, micros, &out_reference).as_slice(),
                out_leg.kind.as_str(),
            )?;
            idx_table.insert(
                make_index_key(recipient_wallet_id, micros, &in_reference).as_slice(),
                in_leg.kind.as_str(),
            )?;

            TransferReceipt {
                reference: correlation.to_string(),
                amount,
                sender_balance,
            }
        };
        write_txn.commit()?;
        Ok(receipt)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Look up a single transaction by its unique reference.
    pub fn transaction_by_reference(
        &self,
        reference: &str,
    ) -> LedgerResult<Option<LedgerTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(reference)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Full history for a wallet, newest first.
    pub fn transactions_for_wallet(&self, wallet_id: &str) -> LedgerResult<Vec<LedgerTransaction>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(WALLET_TXS)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(wallet_id);
        let prefix_end = make_prefix_end(wallet_id);

        let mut results = Vec::new();
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let key_bytes = entry.0.value().to_vec();
            if let Some(reference) = extract_reference_from_key(&key_bytes) {
                if let Some(value) = tx_table.get(reference.as_str())? {
                    results.push(serde_json::from_slice(value.value())?);
                }
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================
