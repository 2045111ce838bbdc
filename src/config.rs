// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! [`Settings`] snapshot loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database and audit logs | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | HS256 shared secret for bearer-token verification | Required |
//! | `PUBLIC_BASE_URL` | Externally reachable base URL, used for gateway callback links | Required for deposits |
//! | `WALLET_CURRENCY` | Currency code stamped on new wallets | `NGN` |
//! | `MIN_DEPOSIT_MINOR` | Minimum deposit amount in minor units | `100` |
//! | `PAYSTACK_SECRET_KEY` | Gateway secret key (API auth + webhook HMAC) | Required for gateway paths |
//! | `PAYSTACK_API_BASE_URL` | Gateway API base URL | `https://api.paystack.co` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |
//!
//! The two `PAYSTACK_*` variables are consumed by
//! [`crate::providers::paystack::PaystackClient::from_env`]; everything else
//! is captured here.

use std::path::PathBuf;

use url::Url;

/// Environment variable name for the data directory path.
///
/// Holds the redb ledger file (`ledger.redb`) and the `audit/` log
/// directory. Must be writable by the service user.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const PUBLIC_BASE_URL_ENV: &str = "PUBLIC_BASE_URL";
pub const WALLET_CURRENCY_ENV: &str = "WALLET_CURRENCY";
pub const MIN_DEPOSIT_MINOR_ENV: &str = "MIN_DEPOSIT_MINOR";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CURRENCY: &str = "NGN";
pub const DEFAULT_MIN_DEPOSIT_MINOR: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Immutable configuration snapshot taken once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Base URL the gateway redirects payers back to. Absent in deployments
    /// that never initiate deposits; the deposit path reports 503 instead of
    /// failing at boot.
    pub public_base_url: Option<Url>,
    pub currency: String,
    pub min_deposit_minor: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let jwt_secret = env_required(JWT_SECRET_ENV)?;
        let port = parse_port(&env_or_default(PORT_ENV, &DEFAULT_PORT.to_string()))?;
        let public_base_url = match std::env::var(PUBLIC_BASE_URL_ENV) {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_base_url(raw.trim())?),
            _ => None,
        };
        let min_deposit_minor = parse_min_deposit(&env_or_default(MIN_DEPOSIT_MINOR_ENV, ""))?;

        Ok(Self {
            data_dir: PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            host: env_or_default(HOST_ENV, DEFAULT_HOST),
            port,
            jwt_secret,
            public_base_url,
            currency: env_or_default(WALLET_CURRENCY_ENV, DEFAULT_CURRENCY),
            min_deposit_minor,
        })
    }
}

fn env_required(name: &'static str) -> Result<String, SettingsError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SettingsError::Missing(name)),
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_port(raw: &str) -> Result<u16, SettingsError> {
    raw.parse::<u16>().map_err(|e| SettingsError::Invalid {
        name: PORT_ENV,
        reason: e.to_string(),
    })
}

fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw).map_err(|e| SettingsError::Invalid {
        name: PUBLIC_BASE_URL_ENV,
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SettingsError::Invalid {
            name: PUBLIC_BASE_URL_ENV,
            reason: format!("unsupported scheme: {}", url.scheme()),
        });
    }
    Ok(url)
}

/// Empty input falls back to the default; zero is rejected because a
/// zero-minimum would let through zero-amount charges.
fn parse_min_deposit(raw: &str) -> Result<u64, SettingsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(DEFAULT_MIN_DEPOSIT_MINOR);
    }
    match raw.parse::<u64>() {
        Ok(0) => Err(SettingsError::Invalid {
            name: MIN_DEPOSIT_MINOR_ENV,
            reason: "must be positive".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(SettingsError::Invalid {
            name: MIN_DEPOSIT_MINOR_ENV,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_port_accepts_valid_and_rejects_garbage() {
        assert_eq!(parse_port("8080").unwrap(), 8080);
        assert!(parse_port("not-a-port").is_err());
        assert!(parse_port("70000").is_err());
    }

    #[test]
    fn parse_base_url_requires_http_scheme() {
        assert!(parse_base_url("https://pay.example.com").is_ok());
        assert!(parse_base_url("http://localhost:8080").is_ok());
        assert!(parse_base_url("ftp://example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn parse_min_deposit_handles_default_zero_and_garbage() {
        assert_eq!(parse_min_deposit("").unwrap(), DEFAULT_MIN_DEPOSIT_MINOR);
        assert_eq!(parse_min_deposit("   ").unwrap(), DEFAULT_MIN_DEPOSIT_MINOR);
        assert_eq!(parse_min_deposit("250").unwrap(), 250);
        assert!(parse_min_deposit("0").is_err());
        assert!(parse_min_deposit("lots").is_err());
    }
}
