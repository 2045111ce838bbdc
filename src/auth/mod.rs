// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! This module provides Bearer JWT authentication for the wallet API.
//!
//! ## Auth Flow
//!
//! 1. The identity service signs an HS256 JWT with the shared `JWT_SECRET`
//! 2. Clients send `Authorization: Bearer <JWT>`
//! 3. This server:
//!    - Verifies the signature and expiry
//!    - Extracts:
//!      - `sub` → canonical `user_id`
//!      - `email`, `name` → payer contact details
//!      - `abilities` → optional scoped permissions
//!
//! ## Security
//!
//! - All wallet endpoints require authentication
//! - The gateway webhook and `/health` endpoints do not; the webhook
//!   authenticates with an HMAC body signature instead
//! - Clock skew tolerance is 60 seconds
//! - A token without an `abilities` claim is unrestricted

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::{Ability, AuthenticatedUser};
pub use error::AuthError;
pub use extractor::Auth;
