//! Authentication module with JWT
//!
//! Tokens are issued by the account service; this side only validates them.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64,        // user id
    pub account_id: i64, // tenant account the user acts for
    pub role: String,
    pub exp: usize,      // expiration timestamp
}

#[derive(Debug, Serialize)]
pub struct AuthError {
    pub message: String,
}

/// Create a JWT token valid for 24 hours
pub fn create_token(user_id: i64, account_id: i64, role: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        account_id,
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate a JWT token and extract claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// JWT Auth extractor - extracts Claims from Authorization header
impl FromRequestParts<Arc<AppState>> for Claims {
    type Rejection = (StatusCode, Json<AuthError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(AuthError { message: "Missing authorization header".to_string() }),
                )
            })?;

        let claims = validate_token(bearer.token(), &state.jwt_secret)
            .map_err(|_| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(AuthError { message: "Invalid token".to_string() }),
                )
            })?;

        Ok(claims)
    }
}
