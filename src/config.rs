// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Built once at startup and carried in `AppState`; nothing else in the
//! crate reads the process environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default upstream endpoint for pose analysis.
pub const DEFAULT_POSE_SERVICE_URL: &str = "https://cyclofit-ai.grity.co/process_video";

/// Upload cap for a single video (200 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Server port
    pub port: u16,
    /// Frontend URL allowed by CORS
    pub client_url: String,
    /// Externally visible base URL of this server (legacy static file links)
    pub public_base_url: String,

    // --- Database ---
    pub mongodb_uri: String,
    /// Database name override; falls back to the one in the URI
    pub mongodb_database: Option<String>,

    // --- Auth ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_secret: Vec<u8>,
    /// Shared key accepted on admin routes in place of an admin session
    pub admin_api_key: Option<String>,
    /// bcrypt work factor for new password hashes
    pub bcrypt_cost: u32,

    // --- Object storage ---
    pub aws_bucket_name: String,
    pub aws_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    /// Custom endpoint for S3-compatible stores (MinIO etc.)
    pub aws_endpoint_url: Option<String>,
    /// Lifetime of issued signed URLs
    pub signed_url_ttl: Duration,
    pub signed_url_cache_capacity: usize,

    // --- Analysis pipeline ---
    pub pose_service_url: String,
    pub pose_service_timeout: Duration,
    pub ffprobe_path: String,
    pub max_upload_bytes: usize,
    /// Directory holding pre-S3 uploads on this host
    pub legacy_upload_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = parse_or("PORT", 5000u16)?;

        Ok(Self {
            port,
            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),

            mongodb_uri: required("MONGODB_URI")?,
            mongodb_database: env::var("MONGODB_DATABASE").ok(),

            jwt_secret: required("JWT_SECRET")?.into_bytes(),
            admin_api_key: env::var("ADMIN_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,

            aws_bucket_name: required("AWS_BUCKET_NAME")?,
            aws_region: required("AWS_REGION")?,
            aws_access_key_id: required("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            aws_endpoint_url: env::var("AWS_ENDPOINT_URL").ok(),
            signed_url_ttl: Duration::from_secs(parse_or("SIGNED_URL_TTL_SECS", 3600u64)?),
            signed_url_cache_capacity: parse_or("SIGNED_URL_CACHE_CAPACITY", 1024usize)?,

            pose_service_url: env::var("PYTHON_SERVER_URL")
                .unwrap_or_else(|_| DEFAULT_POSE_SERVICE_URL.to_string()),
            pose_service_timeout: Duration::from_secs(parse_or("AI_TIMEOUT_SECS", 600u64)?),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            legacy_upload_dir: env::var("LEGACY_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
        })
    }

    /// Config for tests: no external services, short timeouts.
    pub fn test_default() -> Self {
        Self {
            port: 5000,
            client_url: "http://localhost:5173".to_string(),
            public_base_url: "http://localhost:5000".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: Some("cyclofit_test".to_string()),
            jwt_secret: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            admin_api_key: Some("test_admin_key".to_string()),
            bcrypt_cost: 4,
            aws_bucket_name: "cyclofit-test".to_string(),
            aws_region: "us-east-1".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            aws_endpoint_url: None,
            signed_url_ttl: Duration::from_secs(3600),
            signed_url_cache_capacity: 64,
            pose_service_url: "http://127.0.0.1:9/process_video".to_string(),
            pose_service_timeout: Duration::from_secs(5),
            ffprobe_path: "ffprobe-not-installed".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            legacy_upload_dir: PathBuf::from("uploads"),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
