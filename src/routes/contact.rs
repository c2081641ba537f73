// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public contact form and newsletter signup.

use crate::error::{AppError, Result};
use crate::models::{Contact, NewsletterSubscription};
use crate::routes::auth::MessageResponse;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/contact", post(submit_contact))
        .route("/api/newsletter/subscribe", post(subscribe))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email)]
    pub email: String,
}

async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<ContactRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    body.name = body.name.trim().to_string();
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let contact = Contact {
        id: ObjectId::new(),
        name: body.name,
        email: body.email.trim().to_ascii_lowercase(),
        subject: body
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        message: body.message,
        created_at: DateTime::now(),
    };

    state.db.insert_contact(&contact).await?;
    tracing::info!(contact_id = %contact.id, "Contact message received");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message: "Thanks for reaching out".to_string(),
        }),
    ))
}

/// Idempotent: a repeat signup succeeds without a second record.
async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<MessageResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let subscription = NewsletterSubscription {
        id: ObjectId::new(),
        email: body.email.trim().to_ascii_lowercase(),
        subscribed_at: DateTime::now(),
    };

    let created = state.db.subscribe_newsletter(&subscription).await?;
    tracing::info!(created, "Newsletter subscription");

    let message = if created {
        "Subscribed"
    } else {
        "Already subscribed"
    };
    Ok(Json(MessageResponse {
        success: true,
        message: message.to_string(),
    }))
}
