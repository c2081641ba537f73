// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage for analysis assets (S3 or any S3-compatible store).
//!
//! The bucket is private: clients only ever see time-limited presigned
//! GET URLs.

use crate::config::Config;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;

/// Minimal object store interface used by the artifact pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, returning the key.
    async fn upload(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String>;

    /// Time-limited GET URL for `key`.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// S3-backed object store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials in the config.
    ///
    /// A custom endpoint switches to path-style addressing (MinIO etc.).
    pub async fn new(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
            None,
            None,
            "static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.aws_endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(
            bucket = %config.aws_bucket_name,
            region = %config.aws_region,
            endpoint = config.aws_endpoint_url.as_deref().unwrap_or("aws"),
            "S3 object store initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.aws_bucket_name.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String> {
        let size = body.len();
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload of {} failed: {}", key, e))?;

        tracing::debug!(
            key,
            size_bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "S3 upload complete"
        );

        Ok(key.to_string())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to presign {}: {}", key, e))?;

        Ok(request.uri().to_string())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 delete of {} failed: {}", key, e))?;
        Ok(())
    }
}
