// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims read from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the caller's user id.
    pub sub: String,
    /// Expiration timestamp (seconds since the epoch).
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Optional role name; absent or unknown means `client`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The caller a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        let role = claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or_default();
        Self {
            user_id: claims.sub,
            role,
            expires_at: claims.exp,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_claims_takes_subject_as_user_id() {
        let user = AuthenticatedUser::from_claims(TokenClaims {
            sub: "alice".to_string(),
            exp: 1_700_003_600,
            iat: Some(1_700_000_000),
            role: None,
        });
        assert_eq!(user.user_id, "alice");
        assert_eq!(user.expires_at, 1_700_003_600);
        assert!(!user.is_admin());
    }

    #[test]
    fn role_claim_grants_admin() {
        let claims: TokenClaims =
            serde_json::from_str(r#"{"sub":"ops","exp":1,"role":"Admin"}"#).unwrap();
        assert!(AuthenticatedUser::from_claims(claims).is_admin());

        let claims: TokenClaims =
            serde_json::from_str(r#"{"sub":"eve","exp":1,"role":"root"}"#).unwrap();
        assert_eq!(AuthenticatedUser::from_claims(claims).role, Role::Client);
    }

    #[test]
    fn iat_is_optional() {
        let claims: TokenClaims = serde_json::from_str(r#"{"sub":"bob","exp":1}"#).unwrap();
        assert_eq!(claims.iat, None);
        assert_eq!(claims.role, None);
    }
}
