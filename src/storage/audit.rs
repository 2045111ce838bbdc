// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for balance-affecting operations.
//!
//! Deposits, settlements, transfers, and rejected webhooks are appended to
//! daily JSONL files under `<data_dir>/audit/`. Audit writes never fail the
//! request that triggered them; failures are logged and dropped.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Wallet events
    WalletCreated,

    // Deposit events
    DepositInitiated,
    DepositSettled,
    DepositFailed,
    DepositVerified,

    // Transfer events
    TransferExecuted,

    // Webhook events
    WebhookRejected,

    // Auth events
    PermissionDenied,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (absent for gateway-initiated events).
    pub user_id: Option<String>,
    /// Resource affected (wallet_id, reference, etc.).
    pub resource_id: Option<String>,
    /// Resource type (wallet, transaction, etc.).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Append-only JSONL audit sink.
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Create a sink writing under `<data_dir>/audit/`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("audit"),
        }
    }

    /// Append an event to the current day's log file.
    pub fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.dir.join(format!("events-{date}.jsonl"));

        let line = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> std::io::Result<Vec<AuditEvent>> {
        let path = self.dir.join(format!("events-{date}.jsonl"));
        let content = std::fs::read_to_string(path)?;

        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

/// Helper macro for logging audit events tied to an authenticated user.
/// Audit failures are reported as warnings and never propagate.
#[macro_export]
macro_rules! audit_log {
    ($audit:expr, $event_type:expr, $user:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type).with_user(&$user.user_id);
        if let Err(e) = $audit.log(&event) {
            tracing::warn!(error = %e, "failed to write audit event");
        }
    }};
    ($audit:expr, $event_type:expr, $user:expr, $resource_type:expr, $resource_id:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type)
            .with_user(&$user.user_id)
            .with_resource($resource_type, $resource_id);
        if let Err(e) = $audit.log(&event) {
            tracing::warn!(error = %e, "failed to write audit event");
        }
    }};
}
