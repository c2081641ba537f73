// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes. Guarded by `require_admin` in routes/mod.rs.

use crate::error::{AppError, Result};
use crate::middleware::auth::AdminPrincipal;
use crate::models::{Contact, NewsletterSubscription};
use crate::routes::analysis::{AnalysisSummary, DeleteResponse};
use crate::routes::users::UserResponse;
use crate::time_utils::format_bson_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/analyses", get(list_analyses))
        .route("/api/admin/analyses/{id}", delete(delete_analysis))
        .route("/api/admin/contacts", get(list_contacts))
        .route("/api/admin/newsletters", get(list_newsletters))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: String,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id.to_hex(),
            name: c.name,
            email: c.email,
            subject: c.subject,
            message: c.message,
            created_at: format_bson_rfc3339(c.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub email: String,
    pub subscribed_at: String,
}

impl From<NewsletterSubscription> for SubscriptionResponse {
    fn from(s: NewsletterSubscription) -> Self {
        Self {
            email: s.email,
            subscribed_at: format_bson_rfc3339(s.subscribed_at),
        }
    }
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserResponse>>> {
    let users = state.db.list_users().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

async fn list_analyses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AnalysisSummary>>> {
    let analyses = state.db.list_analyses().await?;
    Ok(Json(analyses.iter().map(AnalysisSummary::from).collect()))
}

/// Same cleanup as the owner delete, for any analysis.
async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<AdminPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let not_found = || AppError::NotFound("Analysis not found".to_string());
    let oid = ObjectId::parse_str(&id).map_err(|_| not_found())?;
    let analysis = state.db.get_analysis(&oid).await?.ok_or_else(not_found)?;

    tracing::info!(analysis_id = %oid, principal = ?principal, "Admin analysis deletion");
    state.artifacts.delete(&analysis).await?;

    Ok(Json(DeleteResponse { success: true }))
}

async fn list_contacts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ContactResponse>>> {
    let contacts = state.db.list_contacts().await?;
    Ok(Json(contacts.into_iter().map(ContactResponse::from).collect()))
}

async fn list_newsletters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SubscriptionResponse>>> {
    let subs = state.db.list_newsletter_subscriptions().await?;
    Ok(Json(subs.into_iter().map(SubscriptionResponse::from).collect()))
}
