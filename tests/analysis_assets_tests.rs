// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Asset URL, legacy migration and deletion tests.

use axum::http::StatusCode;
use cyclofit::config::Config;
use cyclofit::db::Database;
use cyclofit::models::{Role, StorageType, StoredAsset};
use std::time::Duration;
use tower::ServiceExt;

mod common;

/// App whose legacy upload directory is a fresh temp dir.
fn app_with_legacy_dir() -> (common::TestApp, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::test_default();
    config.legacy_upload_dir = dir.path().to_path_buf();
    (common::create_test_app_with(config), dir)
}

#[tokio::test]
async fn test_processed_video_url_is_signed() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::s3_analysis(&user.id, 0);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .oneshot(common::get(
            &format!("/api/analysis/{}/processed-video", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let expected_key = format!("videos/{}/processed.mp4", analysis.id.to_hex());
    assert!(body["url"].as_str().unwrap().contains(&expected_key));
    assert_eq!(body["expiresIn"], 3600);
    assert_eq!(body["legacy"], false);
}

#[tokio::test]
async fn test_original_video_is_not_found_for_new_analyses() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::s3_analysis(&user.id, 1);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .oneshot(common::get(
            &format!("/api/analysis/{}/original-video", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_keyframes_list_in_order_with_timestamps() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::s3_analysis(&user.id, 3);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);
    let id = analysis.id.to_hex();

    let response = app
        .router
        .clone()
        .oneshot(common::get(&format!("/api/analysis/{}/keyframes", id), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let frames = body.as_array().unwrap();
    assert_eq!(frames.len(), 3);

    // s3_analysis: duration 6.0 over 3 frames
    let duration = analysis.duration.unwrap();
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame["index"], i);
        assert_eq!(
            frame["timestamp"].as_f64().unwrap(),
            i as f64 * duration / 3.0
        );
        assert_eq!(frame["timestampSource"], "interpolated");
        assert!(frame["url"]
            .as_str()
            .unwrap()
            .contains(&format!("keyframe_{}.jpg", i)));
    }

    let response = app
        .router
        .clone()
        .oneshot(common::get(&format!("/api/analysis/{}/keyframes/2", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["index"], 2);

    let response = app
        .router
        .oneshot(common::get(&format!("/api/analysis/{}/keyframes/3", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_legacy_asset_is_migrated_once() {
    let (app, dir) = app_with_legacy_dir();
    std::fs::write(dir.path().join("legacy_processed.mp4"), b"legacy video").unwrap();

    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::legacy_analysis(&user.id, "legacy_processed.mp4", &[]);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);
    let uri = format!("/api/analysis/{}/processed-video", analysis.id.to_hex());
    let expected_key = format!("videos/{}/processed.mp4", analysis.id.to_hex());

    let first = app
        .router
        .clone()
        .oneshot(common::get(&uri, &token))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = common::body_json(first).await;
    assert_eq!(first["legacy"], false);
    assert!(first["url"].as_str().unwrap().contains(&expected_key));

    let stored = app.db.get_analysis(&analysis.id).await.unwrap().unwrap();
    assert_eq!(
        stored.processed_video,
        Some(StoredAsset::s3(expected_key.clone(), "video/mp4"))
    );
    assert_eq!(stored.storage_type, StorageType::S3);
    assert_eq!(&app.store.object(&expected_key).unwrap().0[..], b"legacy video");

    let second = app
        .router
        .oneshot(common::get(&uri, &token))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = common::body_json(second).await;
    assert_eq!(second["url"], first["url"]);
    assert_eq!(app.store.upload_count(), 1);
}

#[tokio::test]
async fn test_concurrent_first_reads_upload_once() {
    let (app, dir) = app_with_legacy_dir();
    std::fs::write(dir.path().join("p.mp4"), b"video").unwrap();
    std::fs::write(dir.path().join("k0.jpg"), b"frame").unwrap();
    app.store.set_upload_delay(Duration::from_millis(50));

    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::legacy_analysis(&user.id, "p.mp4", &["k0.jpg"]);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);
    let uri = format!("/api/analysis/{}/keyframes/0", analysis.id.to_hex());

    let (a, b) = tokio::join!(
        app.router.clone().oneshot(common::get(&uri, &token)),
        app.router.clone().oneshot(common::get(&uri, &token)),
    );
    let a = common::body_json(a.unwrap()).await;
    let b = common::body_json(b.unwrap()).await;

    assert_eq!(a["url"], b["url"]);
    assert_eq!(app.store.upload_count(), 1);

    // The processed video is still local, so the record stays local.
    let stored = app.db.get_analysis(&analysis.id).await.unwrap().unwrap();
    assert_eq!(stored.storage_type, StorageType::Local);
    assert!(stored.keyframes[0].asset.s3_key().is_some());
}

#[tokio::test]
async fn test_missing_legacy_file_falls_back_to_static_url() {
    let (app, _dir) = app_with_legacy_dir();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::legacy_analysis(&user.id, "gone.mp4", &[]);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .oneshot(common::get(
            &format!("/api/analysis/{}/processed-video", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["url"], "http://localhost:5000/uploads/gone.mp4");
    assert_eq!(body["legacy"], true);
    assert!(body["expiresIn"].is_null());

    // Document untouched
    let stored = app.db.get_analysis(&analysis.id).await.unwrap().unwrap();
    assert_eq!(stored, analysis);
    assert_eq!(app.store.upload_count(), 0);
}

#[tokio::test]
async fn test_delete_removes_objects_and_document() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::s3_analysis(&user.id, 2);
    app.db.insert_analysis(&analysis).await.unwrap();
    for (_, asset) in analysis.assets() {
        app.store.put(asset.s3_key().unwrap(), b"x", "application/octet-stream");
    }
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .oneshot(common::delete(
            &format!("/api/analysis/{}", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.db.get_analysis(&analysis.id).await.unwrap().is_none());
    assert!(app.store.keys().is_empty());
}

#[tokio::test]
async fn test_delete_with_failing_storage_still_removes_document() {
    let app = common::create_test_app();
    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::s3_analysis(&user.id, 2);
    app.db.insert_analysis(&analysis).await.unwrap();
    app.store.set_fail_deletes(true);
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .clone()
        .oneshot(common::delete(
            &format!("/api/analysis/{}", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.db.get_analysis(&analysis.id).await.unwrap().is_none());

    let response = app
        .router
        .oneshot(common::get(
            &format!("/api/analysis/{}", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_legacy_files() {
    let (app, dir) = app_with_legacy_dir();
    let path = dir.path().join("old.mp4");
    std::fs::write(&path, b"old").unwrap();

    let user = common::seed_user(&app.db, "r@example.com", Role::User, None).await;
    let analysis = common::legacy_analysis(&user.id, "old.mp4", &["missing.jpg"]);
    app.db.insert_analysis(&analysis).await.unwrap();
    let token = common::token_for(&user, &app.state.config);

    let response = app
        .router
        .oneshot(common::delete(
            &format!("/api/analysis/{}", analysis.id.to_hex()),
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!path.exists());
    assert!(app.db.get_analysis(&analysis.id).await.unwrap().is_none());
}
