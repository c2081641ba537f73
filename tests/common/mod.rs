// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use bytes::Bytes;
use cyclofit::config::Config;
use cyclofit::db::{Database, MemoryDb};
use cyclofit::middleware::auth::create_jwt;
use cyclofit::models::{
    Analysis, BikeType, Keyframe, MeasurementMap, Role, StorageType, StoredAsset, TimestampSource,
    User,
};
use cyclofit::routes::create_router;
use cyclofit::services::{
    ArtifactService, DurationSource, Ffprobe, ObjectStore, PoseAnalysisClient,
};
use cyclofit::AppState;
use http_body_util::BodyExt;
use mongodb::bson::{oid::ObjectId, DateTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MULTIPART_BOUNDARY: &str = "cyclofit-test-boundary";

/// In-memory object store with failure injection.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    uploads: AtomicUsize,
    fail_deletes: AtomicBool,
    /// Uploads whose key ends with one of these suffixes fail
    failing_suffixes: Mutex<Vec<String>>,
    upload_delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl MemoryObjectStore {
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put(&self, key: &str, body: &[u8], content_type: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (Bytes::copy_from_slice(body), content_type.to_string()),
        );
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_uploads_ending_with(&self, suffix: &str) {
        self.failing_suffixes.lock().unwrap().push(suffix.to_string());
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String> {
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_suffixes
            .lock()
            .unwrap()
            .iter()
            .any(|s| key.ends_with(s.as_str()));
        if failing {
            anyhow::bail!("injected upload failure for {}", key);
        }

        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(key.to_string())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        Ok(format!(
            "https://cyclofit-test.s3.local/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("injected delete failure for {}", key);
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Router plus handles on its in-memory backends.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
    pub store: Arc<MemoryObjectStore>,
}

/// Create a test app with offline in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let durations = Arc::new(Ffprobe::new(config.ffprobe_path.clone()));
    create_test_app_with_durations(config, durations)
}

/// Like [`create_test_app_with`], with video durations from `durations`.
#[allow(dead_code)]
pub fn create_test_app_with_durations(
    config: Config,
    durations: Arc<dyn DurationSource>,
) -> TestApp {
    let db = MemoryDb::new();
    let store = Arc::new(MemoryObjectStore::default());

    let pose_client =
        PoseAnalysisClient::new(config.pose_service_url.clone(), config.pose_service_timeout)
            .expect("client should build");
    let artifacts = ArtifactService::with_durations(
        &config,
        Arc::new(db.clone()),
        store.clone(),
        durations,
    );

    let state = Arc::new(AppState {
        config,
        db: Arc::new(db.clone()),
        pose_client,
        artifacts,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        store,
    }
}

/// Reports fixed durations for known video bytes; anything else is unknown.
#[derive(Default)]
pub struct KnownDurations(HashMap<Vec<u8>, f64>);

#[allow(dead_code)]
impl KnownDurations {
    pub fn with(mut self, video: &[u8], seconds: f64) -> Self {
        self.0.insert(video.to_vec(), seconds);
        self
    }
}

#[async_trait]
impl DurationSource for KnownDurations {
    async fn duration(&self, video: &[u8]) -> Option<f64> {
        self.0.get(video).copied()
    }
}

/// BSON date from an RFC 3339 literal.
#[allow(dead_code)]
pub fn date(rfc3339: &str) -> DateTime {
    DateTime::parse_rfc3339_str(rfc3339).unwrap()
}

/// Insert a user directly into the database.
#[allow(dead_code)]
pub async fn seed_user(db: &MemoryDb, email: &str, role: Role, height_cm: Option<f64>) -> User {
    let user = User {
        id: ObjectId::new(),
        name: "Test Rider".to_string(),
        email: email.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        role,
        height_cm,
        weight_kg: None,
        experience: None,
        email_verified: true,
        verification_token_hash: None,
        created_at: date("2026-01-01T00:00:00Z"),
        updated_at: None,
    };
    assert!(db.insert_user(&user).await.unwrap());
    user
}

#[allow(dead_code)]
pub fn token_for(user: &User, config: &Config) -> String {
    create_jwt(&user.id, &config.jwt_secret).unwrap()
}

/// A stored S3-backed analysis with `keyframes` stills.
#[allow(dead_code)]
pub fn s3_analysis(owner: &ObjectId, keyframes: usize) -> Analysis {
    let id = ObjectId::new();
    let hex = id.to_hex();
    Analysis {
        id,
        user: *owner,
        user_height_cm: 180.0,
        bike_type: BikeType::Road,
        quality: Some("high".to_string()),
        storage_type: StorageType::S3,
        original_video: None,
        processed_video: Some(StoredAsset::s3(
            format!("videos/{}/processed.mp4", hex),
            "video/mp4",
        )),
        keyframes: (0..keyframes)
            .map(|i| Keyframe {
                asset: StoredAsset::s3(format!("videos/{}/keyframe_{}.jpg", hex, i), "image/jpeg"),
                timestamp: Some(i as f64 * 2.0),
                timestamp_source: TimestampSource::Interpolated,
            })
            .collect(),
        duration: Some(2.0 * keyframes as f64),
        max_angles: MeasurementMap::new(),
        min_angles: MeasurementMap::new(),
        body_lengths_cm: MeasurementMap::new(),
        recommendations: serde_json::json!({}),
        created_at: date("2026-02-01T10:00:00Z"),
        updated_at: None,
    }
}

/// A pre-S3 analysis whose assets point at files on disk.
#[allow(dead_code)]
pub fn legacy_analysis(owner: &ObjectId, processed: &str, keyframes: &[&str]) -> Analysis {
    Analysis {
        id: ObjectId::new(),
        user: *owner,
        user_height_cm: 175.0,
        bike_type: BikeType::Road,
        quality: None,
        storage_type: StorageType::Local,
        original_video: None,
        processed_video: Some(StoredAsset::Local {
            file_path: format!("uploads/{}", processed),
        }),
        keyframes: keyframes
            .iter()
            .map(|f| Keyframe {
                asset: StoredAsset::Local {
                    file_path: format!("uploads/{}", f),
                },
                timestamp: None,
                timestamp_source: TimestampSource::Interpolated,
            })
            .collect(),
        duration: None,
        max_angles: MeasurementMap::new(),
        min_angles: MeasurementMap::new(),
        body_lengths_cm: MeasurementMap::new(),
        recommendations: serde_json::Value::Null,
        created_at: date("2025-06-01T10:00:00Z"),
        updated_at: None,
    }
}

#[allow(dead_code)]
pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// One multipart part: name, optional (file name, content type), bytes.
#[allow(dead_code)]
pub type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

#[allow(dead_code)]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        match file {
            Some((file_name, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

#[allow(dead_code)]
pub fn multipart_request(uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
