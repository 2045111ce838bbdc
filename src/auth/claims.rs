// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated caller representation and token abilities.

use super::error::AuthError;

/// Scoped permission carried in a token's `abilities` claim.
///
/// ## Abilities
///
/// - `Deposit` - Initiate and verify gateway deposits
/// - `Transfer` - Move funds to another wallet
/// - `Read` - Read balances and transaction history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ability {
    /// Initiate and verify deposits
    Deposit,
    /// Send wallet-to-wallet transfers
    Transfer,
    /// Read balances and history
    Read,
}

impl Ability {
    /// Parse an ability from string (case-insensitive).
    /// Used when extracting abilities from the JWT `abilities` claim.
    pub fn from_str(s: &str) -> Option<Ability> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(Ability::Deposit),
            "transfer" => Some(Ability::Transfer),
            "read" => Some(Ability::Read),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ability::Deposit => write!(f, "deposit"),
            Ability::Transfer => write!(f, "transfer"),
            Ability::Read => write!(f, "read"),
        }
    }
}

/// Authenticated user information extracted from a verified JWT.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Canonical user ID (the `sub` claim)
    pub user_id: String,

    /// Email address, used as the payer contact when initiating charges
    pub email: String,

    /// Display name (optional)
    pub name: Option<String>,

    /// Granted abilities. `None` means the token is unrestricted.
    pub abilities: Option<Vec<Ability>>,
}

impl AuthenticatedUser {
    /// Check whether this user may perform the given operation.
    pub fn can(&self, ability: Ability) -> bool {
        match &self.abilities {
            // Tokens without an abilities claim are unrestricted
            None => true,
            Some(granted) => granted.contains(&ability),
        }
    }

    /// Require an ability, rejecting with 403 when it is not granted.
    pub fn require(&self, ability: Ability) -> Result<(), AuthError> {
        if self.can(ability) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }
}
