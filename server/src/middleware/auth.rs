// Admin bearer-token authentication middleware
//
// `spec.md` §1 Non-goals: the core "does not validate admin identity beyond
// a bearer-token hook". Unlike the teacher's RS256/ES256 asymmetric-key JWT
// validator (one public key file per deployment), the admin UI here shares
// a single HS256 secret with the control plane (`spec.md` §6 "JWT secret
// for admin-UI cookies") — there is no separate identity provider to hold
// an asymmetric keypair.

use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::types::JwtClaims;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

/// Shared JWT validator state
#[derive(Clone)]
pub struct JwtValidator {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: JwtConfig) -> Result<Self, ApiError> {
        if config.secret.is_empty() {
            return Err(ApiError::Internal("JWT secret must not be empty".to_string()));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.validate_exp = true;
        validation.leeway = 10;
        // Admin tokens are issued by this same service, not a third-party
        // IdP, so there is no separate audience to check.
        validation.validate_aud = false;

        Ok(JwtValidator {
            config,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    /// Issue a bearer token for an admin principal. Used by a future login
    /// endpoint or an operator-facing CLI; not wired to a route yet since
    /// admin identity itself is out of scope (`spec.md` §1).
    pub fn issue(&self, subject: &str) -> Result<String, ApiError> {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.config.ttl_seconds as i64,
            iss: self.config.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("failed to issue admin token: {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, ApiError> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ApiError::Unauthorized(format!("invalid admin token: {e}")))?;

        let claims = token_data.claims;
        if claims.is_expired() {
            return Err(ApiError::Unauthorized("admin token expired".to_string()));
        }
        Ok(claims)
    }
}

/// Middleware function to extract and validate the admin bearer token.
pub async fn jwt_auth_middleware(
    State(validator): State<Arc<JwtValidator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must be a Bearer token".to_string()))?;

    let claims = validator.validate(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor for admin JWT claims from request extensions.
pub struct RequireAuth(pub JwtClaims);

impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<JwtClaims>()
            .cloned()
            .map(RequireAuth)
            .ok_or_else(|| ApiError::Unauthorized("no admin claims on request".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-at-least-this-long".to_string(),
            issuer: "mdm-control-plane".to_string(),
            ttl_seconds: 3600,
        }
    }

    #[test]
    fn issues_and_validates_round_trip() {
        let validator = JwtValidator::new(config()).unwrap();
        let token = validator.issue("admin@acme.test").unwrap();
        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims.sub, "admin@acme.test");
    }

    #[test]
    fn rejects_token_from_different_secret() {
        let validator = JwtValidator::new(config()).unwrap();
        let token = validator.issue("admin").unwrap();

        let other = JwtValidator::new(JwtConfig {
            secret: "a-completely-different-secret".to_string(),
            ..config()
        })
        .unwrap();
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn empty_secret_is_rejected_at_construction() {
        let mut bad = config();
        bad.secret = String::new();
        assert!(JwtValidator::new(bad).is_err());
    }
}
