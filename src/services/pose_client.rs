// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the external pose analysis service.
//!
//! The service receives the raw upload and answers with joint angles, body
//! segment lengths, fit recommendations and (optionally) an annotated video
//! plus keyframe stills, both base64 encoded.

use crate::error::AppError;
use crate::models::{BikeType, MeasurementMap};
use axum::http::StatusCode;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// One analysis request.
#[derive(Debug, Clone)]
pub struct PoseAnalysisRequest {
    pub video: Bytes,
    pub file_name: String,
    pub content_type: String,
    pub user_height_cm: f64,
    pub quality: String,
    pub bike_type: BikeType,
}

/// Response body of the analysis service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoseAnalysisResponse {
    #[serde(default)]
    pub max_angles: MeasurementMap,
    #[serde(default)]
    pub min_angles: MeasurementMap,
    #[serde(default)]
    pub body_lengths_cm: MeasurementMap,
    #[serde(default)]
    pub recommendations: serde_json::Value,
    /// Annotated video, base64 (optionally as a data URI)
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub key_frames: Option<Vec<String>>,
    /// Seconds per keyframe, when the service reports them
    #[serde(default)]
    pub key_frame_timestamps: Option<Vec<f64>>,
}

/// HTTP client for the pose analysis endpoint. No retries.
#[derive(Clone)]
pub struct PoseAnalysisClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PoseAnalysisClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Submit a video and wait for the analysis.
    pub async fn analyze(
        &self,
        request: PoseAnalysisRequest,
    ) -> Result<PoseAnalysisResponse, AppError> {
        let size = request.video.len() as u64;
        let video = Part::stream_with_length(request.video, size)
            .file_name(request.file_name)
            .mime_str(&request.content_type)
            .map_err(|e| AppError::BadRequest(format!("Invalid video content type: {}", e)))?;

        let form = Form::new()
            .part("video", video)
            .text("user_height_cm", request.user_height_cm.to_string())
            .text("quality", request.quality)
            .text("bike_type", request.bike_type.as_str());

        let start = std::time::Instant::now();
        tracing::info!(size_bytes = size, endpoint = %self.endpoint, "Submitting video for analysis");

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let parsed = Self::check_response_json(response).await?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            key_frames = parsed.key_frames.as_ref().map_or(0, Vec::len),
            has_video = parsed.video.is_some(),
            "Analysis service responded"
        );

        Ok(parsed)
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json(
        response: reqwest::Response,
    ) -> Result<PoseAnalysisResponse, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AnalysisService {
                status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                message: format!("HTTP {}: {}", status, truncate(&body, 512)),
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::AnalysisTimeout
            } else {
                AppError::AnalysisService {
                    status: StatusCode::BAD_GATEWAY,
                    message: format!("JSON parse error: {}", e),
                }
            }
        })
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::AnalysisTimeout
    } else {
        AppError::AnalysisService {
            status: StatusCode::BAD_GATEWAY,
            message: format!("Request failed: {}", e),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
