// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication and ownership tests for the analysis routes.
//!
//! These tests verify that:
//! 1. Analysis routes reject requests without a valid session
//! 2. Another user's analysis is indistinguishable from a missing one
//! 3. CORS preflight and security headers are applied

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use cyclofit::db::Database;
use cyclofit::models::Role;
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/analysis")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(common::get("/api/analysis", "not.a.jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_token_signed_with_other_key_is_rejected() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "a@example.com", Role::User, None).await;
    let token =
        cyclofit::middleware::auth::create_jwt(&user.id, b"a_completely_different_secret!!").unwrap();

    let response = app
        .router
        .oneshot(common::get("/api/analysis", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_returns_only_own_analyses_newest_first() {
    let app = common::create_test_app();
    let alice = common::seed_user(&app.db, "alice@example.com", Role::User, None).await;
    let bob = common::seed_user(&app.db, "bob@example.com", Role::User, None).await;

    let mut older = common::s3_analysis(&alice.id, 1);
    older.created_at = common::date("2026-01-01T00:00:00Z");
    let mut newer = common::s3_analysis(&alice.id, 2);
    newer.created_at = common::date("2026-03-01T00:00:00Z");
    let foreign = common::s3_analysis(&bob.id, 1);
    for a in [&older, &newer, &foreign] {
        app.db.insert_analysis(a).await.unwrap();
    }

    let token = common::token_for(&alice, &app.state.config);
    let response = app
        .router
        .oneshot(common::get("/api/analysis", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], newer.id.to_hex());
    assert_eq!(list[0]["keyframeCount"], 2);
    assert_eq!(list[1]["id"], older.id.to_hex());
}

#[tokio::test]
async fn test_foreign_analysis_is_not_found_on_every_route() {
    let app = common::create_test_app();
    let owner = common::seed_user(&app.db, "owner@example.com", Role::User, None).await;
    let intruder = common::seed_user(&app.db, "intruder@example.com", Role::User, None).await;

    let analysis = common::s3_analysis(&owner.id, 2);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&intruder, &app.state.config);
    let id = analysis.id.to_hex();

    let uris = [
        format!("/api/analysis/{}", id),
        format!("/api/analysis/{}/processed-video", id),
        format!("/api/analysis/{}/original-video", id),
        format!("/api/analysis/{}/keyframes", id),
        format!("/api/analysis/{}/keyframes/0", id),
    ];

    for uri in &uris {
        let response = app
            .router
            .clone()
            .oneshot(common::get(uri, &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {}", uri);
    }

    let response = app
        .router
        .clone()
        .oneshot(common::delete(&format!("/api/analysis/{}", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still there for its owner
    assert!(app.db.get_analysis(&analysis.id).await.unwrap().is_some());
    assert_eq!(app.store.upload_count(), 0);
}

#[tokio::test]
async fn test_unknown_and_unparsable_ids_look_the_same() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "u@example.com", Role::User, None).await;
    let token = common::token_for(&user, &app.state.config);

    for id in ["65a1b2c3d4e5f6a7b8c9d0e1", "not-an-object-id"] {
        let response = app
            .router
            .clone()
            .oneshot(common::get(&format!("/api/analysis/{}", id), &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = common::body_json(response).await;
        assert_eq!(body["details"], "Analysis not found");
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_cors_preflight_allows_client_origin() {
    let app = common::create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/analysis")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}
