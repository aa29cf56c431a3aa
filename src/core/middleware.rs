use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::CrmError;
use crate::core::shared::state::AppState;
use crate::tenancy::TenantContext;

// ============================================================================
// User Context (Authentication)
// ============================================================================

/// Authenticated user extracted from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            email: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_nil()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn decode_user(token: &str, secret: &str) -> Result<AuthenticatedUser, CrmError> {
    if secret.is_empty() {
        return Err(CrmError::Unauthenticated);
    }

    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        log::debug!("Rejected bearer token: {e}");
        CrmError::Unauthenticated
    })?;

    let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| CrmError::Unauthenticated)?;
    let mut user = AuthenticatedUser::new(user_id);
    user.email = data.claims.email;
    Ok(user)
}

/// Signs an HS256 token; used by tooling and tests.
pub fn issue_token(
    user_id: Uuid,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp(),
        email: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = CrmError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(CrmError::Unauthenticated)?;
        decode_user(token, &state.config.auth.jwt_secret)
    }
}

// ============================================================================
// Tenant Context
// ============================================================================

#[async_trait]
impl FromRequestParts<Arc<AppState>> for TenantContext {
    type Rejection = CrmError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        state.tenants.resolve(&user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok123"));
        assert_eq!(extract_bearer_token(&headers), Some("tok123"));
    }

    #[test]
    fn test_token_round_trip_and_wrong_secret() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, "s3cret", chrono::Duration::minutes(5)).unwrap();

        let user = decode_user(&token, "s3cret").unwrap();
        assert_eq!(user.user_id, user_id);
        assert!(user.is_authenticated());

        assert!(matches!(
            decode_user(&token, "other"),
            Err(CrmError::Unauthenticated)
        ));
        assert!(matches!(decode_user(&token, ""), Err(CrmError::Unauthenticated)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = issue_token(Uuid::new_v4(), "s3cret", chrono::Duration::hours(-2)).unwrap();
        assert!(decode_user(&token, "s3cret").is_err());
    }
}
