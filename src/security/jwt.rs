use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::security::claims::Principal;

/// JWT payload carried by incoming bearer tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(subject: String, roles: Vec<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: subject,
            roles,
            exp,
            iat: now.timestamp(),
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            subject: claims.sub,
            claims: claims.roles,
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("JWT secret not configured")]
    InvalidSecret,
}

/// Middleware that extracts a bearer-token principal into the request
/// extensions. A missing or invalid token is not an error here: the
/// request proceeds without a principal and authorization decides its
/// fate. Authentication itself lives outside this crate.
pub async fn principal_middleware(
    State(config): State<Arc<SecurityConfig>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&headers) {
        match validate_jwt(&token, &config.jwt_secret) {
            Ok(claims) => {
                request.extensions_mut().insert(Principal::from(claims));
            }
            Err(reason) => {
                tracing::debug!("ignoring bearer token: {}", reason);
            }
        }
    }
    next.run(request).await
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_str = headers.get("authorization")?.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Validate a token and extract its claims.
fn validate_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    if secret.is_empty() {
        return Err("JWT secret not configured".to_string());
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| format!("invalid JWT token: {}", e))?;

    Ok(token_data.claims)
}

/// Mint a token for a principal, for the demo binary and tests.
pub fn issue_token(principal: &Principal, config: &SecurityConfig) -> Result<String, JwtError> {
    if config.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let claims = Claims::new(
        principal.subject.clone(),
        principal.claims.clone(),
        config.jwt_expiry_hours,
    );
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}
