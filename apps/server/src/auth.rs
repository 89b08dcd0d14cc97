use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared_proto::session::Role;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verified identity of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid token")]
    InvalidCredential,
    #[error("Access denied")]
    Forbidden,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated | AuthError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::Forbidden => "forbidden",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string(), "code": self.code() })),
        )
            .into_response()
    }
}

/// Turns a bearer credential into a [`Principal`].
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// HS256 tokens shared with the account service.
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(24),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mints a token; used by tooling and tests, not exposed over HTTP.
    pub fn issue(&self, principal: Principal) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.id.to_string(),
            role: principal.role.as_str().to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|_| AuthError::InvalidCredential)
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(component = "auth", error = %err, "token rejected");
                AuthError::InvalidCredential
            })?;

        let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidCredential)?;
        let role = Role::parse(&claims.role).ok_or(AuthError::InvalidCredential)?;
        Ok(Principal { id, role })
    }
}

/// Resolves an optional raw credential, as presented on the socket handshake.
pub fn admit(verifier: &dyn CredentialVerifier, token: Option<&str>) -> Result<Principal, AuthError> {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => verifier.verify(token),
        None => Err(AuthError::Unauthenticated),
    }
}

/// Authenticated caller extractor for Axum
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

impl AuthUser {
    pub fn require_role(&self, role: Role) -> Result<(), AuthError> {
        if self.0.role == role {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::Unauthenticated)?;

        state.verifier.verify(bearer.token()).map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_to_the_same_principal() {
        let verifier = JwtVerifier::new(b"test-secret");
        let principal = Principal { id: Uuid::new_v4(), role: Role::Therapist };

        let token = verifier.issue(principal).expect("token");
        assert_eq!(verifier.verify(&token), Ok(principal));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let issuer = JwtVerifier::new(b"other-secret");
        let verifier = JwtVerifier::new(b"test-secret");
        let token = issuer
            .issue(Principal { id: Uuid::new_v4(), role: Role::User })
            .expect("token");

        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let verifier = JwtVerifier::new(b"test-secret").with_ttl(Duration::hours(-2));
        let token = verifier
            .issue(Principal { id: Uuid::new_v4(), role: Role::User })
            .expect("token");

        assert_eq!(verifier.verify(&token), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn admission_distinguishes_missing_from_invalid() {
        let verifier = JwtVerifier::new(b"test-secret");
        assert_eq!(admit(&verifier, None), Err(AuthError::Unauthenticated));
        assert_eq!(admit(&verifier, Some("  ")), Err(AuthError::Unauthenticated));
        assert_eq!(admit(&verifier, Some("garbage")), Err(AuthError::InvalidCredential));
    }
}
