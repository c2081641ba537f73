// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile routes for the signed-in user.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Experience, Role, User};
use crate::time_utils::format_bson_rfc3339;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/users/me", get(get_me).put(update_me))
}

/// Public view of an account (no credentials).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"user\" | \"admin\" | \"super_admin\""))]
    pub role: Role,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub experience: Option<Experience>,
    pub email_verified: bool,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_hex(),
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            height_cm: u.height_cm,
            weight_kg: u.weight_kg,
            experience: u.experience,
            email_verified: u.email_verified,
            created_at: format_bson_rfc3339(u.created_at),
        }
    }
}

/// Profile fields a user may change. Omitted fields are left alone.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 100.0, max = 250.0))]
    pub height_cm: Option<f64>,
    #[validate(range(min = 20.0, max = 300.0))]
    pub weight_kg: Option<f64>,
    pub experience: Option<Experience>,
}

async fn load_user(state: &AppState, user: &AuthUser) -> Result<User> {
    state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = load_user(&state, &user).await?;
    Ok(Json(UserResponse::from(&profile)))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(mut body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    body.name = body.name.map(|n| n.trim().to_string());
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut profile = load_user(&state, &user).await?;

    if let Some(name) = body.name {
        profile.name = name;
    }
    if body.height_cm.is_some() {
        profile.height_cm = body.height_cm;
    }
    if body.weight_kg.is_some() {
        profile.weight_kg = body.weight_kg;
    }
    if body.experience.is_some() {
        profile.experience = body.experience;
    }
    profile.updated_at = Some(DateTime::now());

    state.db.update_user(&profile).await?;
    tracing::info!(user_id = %user.user_id, "Profile updated");

    Ok(Json(UserResponse::from(&profile)))
}
