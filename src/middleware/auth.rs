// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication and admin authorization middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header carrying the shared admin key.
pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

/// Session lifetime (7 days).
const TOKEN_TTL_SECS: usize = 7 * 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ObjectId (hex)
    pub id: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: ObjectId,
}

/// How an admin request was authorized.
#[derive(Debug, Clone)]
pub enum AdminPrincipal {
    ApiKey,
    User(ObjectId),
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate a session token and return the user it names.
pub fn verify_jwt(token: &str, signing_key: &[u8]) -> Result<ObjectId, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| AppError::InvalidToken)?;

    ObjectId::parse_str(&token_data.claims.id).map_err(|_| AppError::InvalidToken)
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let user_id = verify_jwt(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}

/// Middleware for admin routes: the admin API key, or a session whose user
/// has an admin role.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented_key = request
        .headers()
        .get(ADMIN_API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    let principal = match (presented_key, state.config.admin_api_key.as_deref()) {
        (Some(presented), Some(expected)) if constant_time_eq(presented, expected) => {
            AdminPrincipal::ApiKey
        }
        (Some(_), Some(_)) => return Err(AppError::Forbidden),
        // No key configured: the header is ignored and a session is required.
        _ => {
            let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
            let user_id = verify_jwt(token, &state.config.jwt_secret)?;

            let user = state
                .db
                .get_user(&user_id)
                .await?
                .ok_or(AppError::InvalidToken)?;
            if !user.role.is_admin() {
                tracing::warn!(user_id = %user_id, "Non-admin user attempted admin access");
                return Err(AppError::Forbidden);
            }
            AdminPrincipal::User(user_id)
        }
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}

/// Create a JWT for a user session.
pub fn create_jwt(user_id: &ObjectId, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        id: user_id.to_hex(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}
