// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password account routes: register, login, email verification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mongodb::bson::{oid::ObjectId, DateTime};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::{Role, User};
use crate::routes::users::UserResponse;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify-email/{token}", get(verify_email))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Session token plus the account it belongs to.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// SHA-256 (hex) of a verification token, as stored on the user.
pub fn hash_verification_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_verification_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(hex::encode(bytes))
}

async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// An unreadable stored hash counts as a mismatch.
async fn verify_password(password: String, hash: String) -> Result<bool> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?;

    Ok(verified.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored password hash is not valid bcrypt");
        false
    }))
}

fn session_for(state: &AppState, user: &User) -> Result<AuthResponse> {
    let token = create_jwt(&user.id, &state.config.jwt_secret)?;
    Ok(AuthResponse {
        token,
        user: UserResponse::from(user),
    })
}

/// Create an account and sign it in.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    body.name = body.name.trim().to_string();
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let email = normalize_email(&body.email);
    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    let token = generate_verification_token()?;
    let user = User {
        id: ObjectId::new(),
        name: body.name,
        email,
        password_hash: hash_password(body.password, state.config.bcrypt_cost).await?,
        role: Role::User,
        height_cm: None,
        weight_kg: None,
        experience: None,
        email_verified: false,
        verification_token_hash: Some(hash_verification_token(&token)),
        created_at: DateTime::now(),
        updated_at: None,
    };

    // The lookup above is only a fast path; the insert decides a race.
    if !state.db.insert_user(&user).await? {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    tracing::info!(user_id = %user.id, "User registered");
    // No mail transport; the link is only logged.
    tracing::debug!(
        user_id = %user.id,
        link = %format!("{}/verify-email/{}", state.config.client_url, token),
        "Email verification link"
    );

    Ok((StatusCode::CREATED, Json(session_for(&state, &user)?)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = state
        .db
        .find_user_by_email(&normalize_email(&body.email))
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(body.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AppError::Unauthorized);
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(session_for(&state, &user)?))
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>> {
    let mut user = state
        .db
        .find_user_by_verification_token(&hash_verification_token(&token))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired verification link".to_string()))?;

    user.email_verified = true;
    user.verification_token_hash = None;
    user.updated_at = Some(DateTime::now());
    state.db.update_user(&user).await?;

    tracing::info!(user_id = %user.id, "Email verified");
    Ok(Json(MessageResponse {
        success: true,
        message: "Email verified".to_string(),
    }))
}
