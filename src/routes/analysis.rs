// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analysis routes: upload a riding video, read back results and media.
//!
//! Every route requires a session; records owned by another user are
//! reported as missing.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Analysis, AssetSlot, BikeType, MeasurementMap, StorageType, TimestampSource};
use crate::services::{NewAnalysis, PoseAnalysisRequest, ResolvedUrl};
use crate::time_utils::format_bson_rfc3339;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Accepted rider height range (cm).
const MIN_HEIGHT_CM: f64 = 100.0;
const MAX_HEIGHT_CM: f64 = 250.0;

const DEFAULT_QUALITY: &str = "high";

/// Analysis routes (require authentication via JWT).
pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/analysis/process",
            post(process_video).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/analysis", get(list_analyses))
        .route("/api/analysis/{id}", get(get_analysis).delete(delete_analysis))
        .route("/api/analysis/{id}/processed-video", get(get_processed_video))
        .route("/api/analysis/{id}/original-video", get(get_original_video))
        .route("/api/analysis/{id}/keyframes", get(list_keyframes))
        .route("/api/analysis/{id}/keyframes/{index}", get(get_keyframe))
}

// ─── Response Types ──────────────────────────────────────────

/// Keyframe metadata (no URL).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KeyframeInfo {
    pub index: usize,
    pub timestamp: Option<f64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"upstream\" | \"interpolated\""))]
    pub timestamp_source: TimestampSource,
}

/// Full analysis as returned to its owner.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AnalysisResponse {
    pub id: String,
    pub user_height_cm: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub bike_type: BikeType,
    pub quality: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"local\" | \"s3\""))]
    pub storage_type: StorageType,
    pub duration: Option<f64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, number>"))]
    pub max_angles: MeasurementMap,
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, number>"))]
    pub min_angles: MeasurementMap,
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, number>"))]
    pub body_lengths_cm: MeasurementMap,
    #[cfg_attr(feature = "binding-generation", ts(type = "unknown"))]
    pub recommendations: serde_json::Value,
    pub has_processed_video: bool,
    pub has_original_video: bool,
    pub keyframes: Vec<KeyframeInfo>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<&Analysis> for AnalysisResponse {
    fn from(a: &Analysis) -> Self {
        Self {
            id: a.id.to_hex(),
            user_height_cm: a.user_height_cm,
            bike_type: a.bike_type,
            quality: a.quality.clone(),
            storage_type: a.storage_type,
            duration: a.duration,
            max_angles: a.max_angles.clone(),
            min_angles: a.min_angles.clone(),
            body_lengths_cm: a.body_lengths_cm.clone(),
            recommendations: a.recommendations.clone(),
            has_processed_video: a.processed_video.is_some(),
            has_original_video: a.original_video.is_some(),
            keyframes: a
                .keyframes
                .iter()
                .enumerate()
                .map(|(index, k)| KeyframeInfo {
                    index,
                    timestamp: k.timestamp,
                    timestamp_source: k.timestamp_source,
                })
                .collect(),
            created_at: format_bson_rfc3339(a.created_at),
            updated_at: a.updated_at.map(format_bson_rfc3339),
        }
    }
}

/// List entry.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AnalysisSummary {
    pub id: String,
    /// Owner (hex id)
    pub user: String,
    pub user_height_cm: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub bike_type: BikeType,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"local\" | \"s3\""))]
    pub storage_type: StorageType,
    pub duration: Option<f64>,
    pub keyframe_count: usize,
    pub has_processed_video: bool,
    pub created_at: String,
}

impl From<&Analysis> for AnalysisSummary {
    fn from(a: &Analysis) -> Self {
        Self {
            id: a.id.to_hex(),
            user: a.user.to_hex(),
            user_height_cm: a.user_height_cm,
            bike_type: a.bike_type,
            storage_type: a.storage_type,
            duration: a.duration,
            keyframe_count: a.keyframes.len(),
            has_processed_video: a.processed_video.is_some(),
            created_at: format_bson_rfc3339(a.created_at),
        }
    }
}

/// Result of a successful upload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProcessResponse {
    pub analysis_id: String,
    pub analysis_result: AnalysisResponse,
}

/// Link to a single asset.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AssetUrlResponse {
    pub url: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub expires_in: Option<u64>,
    pub legacy: bool,
}

impl From<ResolvedUrl> for AssetUrlResponse {
    fn from(r: ResolvedUrl) -> Self {
        Self {
            url: r.url,
            expires_in: r.expires_in,
            legacy: r.legacy,
        }
    }
}

/// Keyframe with its link.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KeyframeUrlResponse {
    pub index: usize,
    pub timestamp: Option<f64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"upstream\" | \"interpolated\""))]
    pub timestamp_source: TimestampSource,
    pub url: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub expires_in: Option<u64>,
    pub legacy: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteResponse {
    pub success: bool,
}

// ─── Ownership ───────────────────────────────────────────────

fn analysis_not_found() -> AppError {
    AppError::NotFound("Analysis not found".to_string())
}

/// Load an analysis owned by `user`. Unparsable, unknown and foreign ids
/// are indistinguishable.
pub(crate) async fn load_owned(state: &AppState, user: &AuthUser, id: &str) -> Result<Analysis> {
    let oid = ObjectId::parse_str(id).map_err(|_| analysis_not_found())?;

    state
        .db
        .get_analysis(&oid)
        .await?
        .filter(|a| a.user == user.user_id)
        .ok_or_else(analysis_not_found)
}

// ─── Upload ──────────────────────────────────────────────────

struct VideoUpload {
    data: Bytes,
    file_name: String,
    content_type: String,
}

#[derive(Default)]
struct ProcessForm {
    video: Option<VideoUpload>,
    height: Option<f64>,
    bike_type: Option<BikeType>,
    quality: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Malformed upload: {}", e.body_text()))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ProcessForm> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !content_type.starts_with("video/") {
                    return Err(AppError::BadRequest(format!(
                        "Unsupported video type: {}",
                        content_type
                    )));
                }
                let file_name = field.file_name().unwrap_or("video.mp4").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                form.video = Some(VideoUpload {
                    data,
                    file_name,
                    content_type,
                });
            }
            "height" => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    let height = raw.trim().parse::<f64>().map_err(|_| {
                        AppError::BadRequest(format!("Invalid height: {}", raw.trim()))
                    })?;
                    form.height = Some(height);
                }
            }
            "bikeType" => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    form.bike_type = Some(raw.parse().map_err(AppError::BadRequest)?);
                }
            }
            "quality" => {
                let raw = field.text().await.map_err(multipart_error)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    form.quality = Some(raw.to_ascii_lowercase());
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }

    Ok(form)
}

fn validate_height(height: f64) -> Result<f64> {
    if height.is_finite() && (MIN_HEIGHT_CM..=MAX_HEIGHT_CM).contains(&height) {
        Ok(height)
    } else {
        Err(AppError::BadRequest(format!(
            "Height must be between {} and {} cm",
            MIN_HEIGHT_CM, MAX_HEIGHT_CM
        )))
    }
}

/// Forward a video to the analysis service and store the results.
async fn process_video(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>> {
    let form = read_form(multipart).await?;

    let video = form
        .video
        .ok_or_else(|| AppError::BadRequest("No video file uploaded".to_string()))?;
    if video.data.is_empty() {
        return Err(AppError::BadRequest("Uploaded video is empty".to_string()));
    }

    let height = match form.height {
        Some(h) => h,
        None => state
            .db
            .get_user(&user.user_id)
            .await?
            .and_then(|u| u.height_cm)
            .ok_or_else(|| {
                AppError::BadRequest("Height is required (no height in profile)".to_string())
            })?,
    };
    let height = validate_height(height)?;
    let bike_type = form.bike_type.unwrap_or_default();
    let quality = form.quality.unwrap_or_else(|| DEFAULT_QUALITY.to_string());

    tracing::info!(
        user_id = %user.user_id,
        size_bytes = video.data.len(),
        height_cm = height,
        bike_type = bike_type.as_str(),
        "Processing analysis upload"
    );

    let response = state
        .pose_client
        .analyze(PoseAnalysisRequest {
            video: video.data.clone(),
            file_name: video.file_name,
            content_type: video.content_type,
            user_height_cm: height,
            quality: quality.clone(),
            bike_type,
        })
        .await?;

    let analysis = state
        .artifacts
        .persist(
            NewAnalysis {
                user: user.user_id,
                user_height_cm: height,
                bike_type,
                quality,
                original_video: video.data,
            },
            response,
        )
        .await?;

    Ok(Json(ProcessResponse {
        analysis_id: analysis.id.to_hex(),
        analysis_result: AnalysisResponse::from(&analysis),
    }))
}

// ─── Read ────────────────────────────────────────────────────

/// The caller's analyses, newest first.
async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<AnalysisSummary>>> {
    let analyses = state.db.list_analyses_for_user(&user.user_id).await?;
    Ok(Json(analyses.iter().map(AnalysisSummary::from).collect()))
}

async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>> {
    let analysis = load_owned(&state, &user, &id).await?;
    Ok(Json(AnalysisResponse::from(&analysis)))
}

async fn get_processed_video(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<AssetUrlResponse>> {
    let analysis = load_owned(&state, &user, &id).await?;
    let resolved = state
        .artifacts
        .resolve(&analysis, AssetSlot::ProcessedVideo)
        .await?;
    Ok(Json(resolved.into()))
}

/// Only legacy analyses have a stored original.
async fn get_original_video(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<AssetUrlResponse>> {
    let analysis = load_owned(&state, &user, &id).await?;
    let resolved = state
        .artifacts
        .resolve(&analysis, AssetSlot::OriginalVideo)
        .await?;
    Ok(Json(resolved.into()))
}

async fn list_keyframes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<KeyframeUrlResponse>>> {
    let analysis = load_owned(&state, &user, &id).await?;

    let mut frames = Vec::with_capacity(analysis.keyframes.len());
    for (index, frame) in analysis.keyframes.iter().enumerate() {
        let resolved = state
            .artifacts
            .resolve(&analysis, AssetSlot::Keyframe(index))
            .await?;
        frames.push(KeyframeUrlResponse {
            index,
            timestamp: frame.timestamp,
            timestamp_source: frame.timestamp_source,
            url: resolved.url,
            expires_in: resolved.expires_in,
            legacy: resolved.legacy,
        });
    }

    Ok(Json(frames))
}

async fn get_keyframe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<KeyframeUrlResponse>> {
    let analysis = load_owned(&state, &user, &id).await?;
    let frame = analysis
        .keyframes
        .get(index)
        .ok_or_else(|| AppError::NotFound(format!("Keyframe {} not found", index)))?;

    let resolved = state
        .artifacts
        .resolve(&analysis, AssetSlot::Keyframe(index))
        .await?;

    Ok(Json(KeyframeUrlResponse {
        index,
        timestamp: frame.timestamp,
        timestamp_source: frame.timestamp_source,
        url: resolved.url,
        expires_in: resolved.expires_in,
        legacy: resolved.legacy,
    }))
}

// ─── Delete ──────────────────────────────────────────────────

async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let analysis = load_owned(&state, &user, &id).await?;

    tracing::info!(user_id = %user.user_id, analysis_id = %analysis.id, "User-initiated analysis deletion");
    state.artifacts.delete(&analysis).await?;

    Ok(Json(DeleteResponse { success: true }))
}
