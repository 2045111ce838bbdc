// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;

use super::{Ability, AuthError, AuthenticatedUser};
use crate::state::{AppState, AuthKeys};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Claims this server reads from a verified token.
///
/// `exp` is required and enforced by the validation step, so it does not
/// appear here.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    /// Subject (user ID)
    sub: String,
    /// Payer contact email
    email: String,
    /// Display name
    #[serde(default)]
    name: Option<String>,
    /// Granted abilities. Absent means unrestricted.
    #[serde(default)]
    abilities: Option<Vec<String>>,
}

/// Extractor for authenticated users.
///
/// This extractor validates the HS256 JWT from the Authorization header
/// and provides the authenticated user information.
///
/// # Example
///
/// ```rust,ignore
/// async fn get_balance(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<BalanceResponse>, ApiError> {
///     // user.user_id contains the authenticated user's ID
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A user injected via request extensions wins over the header
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        // Extract Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_token(token, &state.auth)?;

        Ok(Auth(user))
    }
}

/// Verify an HS256 token against the shared secret and extract the caller.
pub fn verify_token(token: &str, keys: &AuthKeys) -> Result<AuthenticatedUser, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_aud = false;

    let token_data =
        decode::<JwtClaims>(token, &keys.decoding, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })?;

    let claims = token_data.claims;

    // Unknown ability names are dropped; they grant nothing here
    let abilities = claims.abilities.map(|names| {
        names
            .iter()
            .filter_map(|name| Ability::from_str(name))
            .collect()
    });

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email,
        name: claims.name,
        abilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::state::AppState;
    use crate::storage::{AuditLog, LedgerDb};
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tempfile::TempDir;

    const TEST_SECRET: &str = "extractor-test-secret";

    #[derive(serde::Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: &'a str,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        abilities: Option<Vec<&'a str>>,
    }

    fn mint(secret: &str, claims: &TestClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token should encode")
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let ledger = LedgerDb::open(&dir.path().join("ledger.redb")).expect("open ledger");
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: TEST_SECRET.to_string(),
            public_base_url: None,
            currency: "NGN".to_string(),
            min_deposit_minor: 100,
        };
        let audit = AuditLog::new(dir.path());
        (AppState::new(ledger, settings, audit), dir)
    }

    fn parts_with_header(value: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = value {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _dir) = test_state();
        let mut parts = parts_with_header(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_non_bearer_scheme() {
        let (state, _dir) = test_state();
        let mut parts = parts_with_header(Some("Token abc".to_string()));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_accepts_signed_token() {
        let (state, _dir) = test_state();
        let token = mint(
            TEST_SECRET,
            &TestClaims {
                sub: "user_123",
                email: "user@example.com",
                exp: future_exp(),
                abilities: None,
            },
        );
        let mut parts = parts_with_header(Some(format!("Bearer {token}")));

        let user = Auth::from_request_parts(&mut parts, &state)
            .await
            .expect("valid token should authenticate")
            .0;
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.email, "user@example.com");
        assert!(user.abilities.is_none());
    }

    #[tokio::test]
    async fn auth_extractor_rejects_wrong_secret() {
        let (state, _dir) = test_state();
        let token = mint(
            "another-secret",
            &TestClaims {
                sub: "user_123",
                email: "user@example.com",
                exp: future_exp(),
                abilities: None,
            },
        );
        let mut parts = parts_with_header(Some(format!("Bearer {token}")));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_expired_token() {
        let (state, _dir) = test_state();
        let token = mint(
            TEST_SECRET,
            &TestClaims {
                sub: "user_123",
                email: "user@example.com",
                // Well past the 60s leeway
                exp: chrono::Utc::now().timestamp() - 3600,
                abilities: None,
            },
        );
        let mut parts = parts_with_header(Some(format!("Bearer {token}")));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn auth_extractor_parses_abilities() {
        let (state, _dir) = test_state();
        let token = mint(
            TEST_SECRET,
            &TestClaims {
                sub: "user_123",
                email: "user@example.com",
                exp: future_exp(),
                abilities: Some(vec!["read", "some_future_ability"]),
            },
        );
        let mut parts = parts_with_header(Some(format!("Bearer {token}")));

        let user = Auth::from_request_parts(&mut parts, &state)
            .await
            .expect("valid token should authenticate")
            .0;
        assert!(user.can(Ability::Read));
        assert!(!user.can(Ability::Transfer));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _dir) = test_state();
        let mut parts = parts_with_header(None);

        let user = AuthenticatedUser {
            user_id: "user_from_extensions".to_string(),
            email: "injected@example.com".to_string(),
            name: None,
            abilities: None,
        };
        parts.extensions.insert(user.clone());

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.unwrap().0.user_id, "user_from_extensions");
    }
}
