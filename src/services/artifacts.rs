// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analysis artifacts: persisting pose results, issuing asset URLs, and
//! cleaning up on delete.
//!
//! Handles:
//! - Decoding and uploading the annotated video and keyframe stills
//! - Keyframe timestamps (upstream when reported, interpolated otherwise)
//! - Lazy migration of legacy on-disk assets to object storage
//! - Best-effort removal of every stored object on delete

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::models::analysis::interpolated_timestamps;
use crate::models::{
    Analysis, AssetSlot, BikeType, Keyframe, StorageType, StoredAsset, TimestampSource,
};
use crate::services::object_store::ObjectStore;
use crate::services::ffprobe::{DurationSource, Ffprobe};
use crate::services::pose_client::PoseAnalysisResponse;
use crate::services::url_cache::SignedUrlCache;
use axum::http::StatusCode;
use base64::Engine;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{future, stream, StreamExt};
use mongodb::bson::{oid::ObjectId, DateTime};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Parallel keyframe uploads per analysis.
const KEYFRAME_UPLOAD_CONCURRENCY: usize = 4;

const VIDEO_MP4: &str = "video/mp4";
const IMAGE_JPEG: &str = "image/jpeg";

/// Per-analysis migration locks.
pub type MigrationLocks = Arc<DashMap<ObjectId, Arc<Mutex<()>>>>;

/// Inputs for a freshly analysed upload.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub user: ObjectId,
    pub user_height_cm: f64,
    pub bike_type: BikeType,
    pub quality: String,
    /// Raw upload; measured for duration but not stored
    pub original_video: Bytes,
}

/// A client-facing link to an asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    pub url: String,
    /// Seconds until a signed URL expires; `None` for static links
    pub expires_in: Option<u64>,
    /// Served from the legacy static directory
    pub legacy: bool,
}

/// Owns everything that touches stored analysis assets.
pub struct ArtifactService {
    db: Arc<dyn Database>,
    store: Arc<dyn ObjectStore>,
    durations: Arc<dyn DurationSource>,
    url_cache: SignedUrlCache,
    migration_locks: MigrationLocks,
    url_ttl: Duration,
    legacy_upload_dir: PathBuf,
    public_base_url: String,
}

impl ArtifactService {
    pub fn new(config: &Config, db: Arc<dyn Database>, store: Arc<dyn ObjectStore>) -> Self {
        let durations = Arc::new(Ffprobe::new(config.ffprobe_path.clone()));
        Self::with_durations(config, db, store, durations)
    }

    pub fn with_durations(
        config: &Config,
        db: Arc<dyn Database>,
        store: Arc<dyn ObjectStore>,
        durations: Arc<dyn DurationSource>,
    ) -> Self {
        Self {
            db,
            store,
            durations,
            url_cache: SignedUrlCache::new(config.signed_url_cache_capacity),
            migration_locks: Arc::new(DashMap::new()),
            url_ttl: config.signed_url_ttl,
            legacy_upload_dir: config.legacy_upload_dir.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    // ─── Persist ─────────────────────────────────────────────────────────────

    /// Upload the service's media output and insert the analysis document.
    ///
    /// Uploads and the insert are not transactional: a failed insert leaves
    /// the uploaded objects behind.
    pub async fn persist(
        &self,
        new: NewAnalysis,
        response: PoseAnalysisResponse,
    ) -> Result<Analysis, AppError> {
        let id = ObjectId::new();
        let original_duration = self.durations.duration(&new.original_video).await;

        let mut processed_video = None;
        let mut processed_duration = None;
        if let Some(encoded) = response.video.as_deref() {
            let data = Bytes::from(decode_base64(encoded).map_err(|e| {
                AppError::AnalysisService {
                    status: StatusCode::BAD_GATEWAY,
                    message: format!("Corrupt processed video payload: {}", e),
                }
            })?);

            processed_duration = self.durations.duration(&data).await;

            let key = AssetSlot::ProcessedVideo.object_key(&id, "");
            self.store
                .upload(data, &key, VIDEO_MP4)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
            processed_video = Some(StoredAsset::s3(key, VIDEO_MP4));
        }

        let duration = processed_duration.or(original_duration);

        let frames = response.key_frames.unwrap_or_default();
        let count = frames.len();
        let (timestamps, source) = match response.key_frame_timestamps {
            Some(ts) if ts.len() == count => (
                ts.into_iter().map(Some).collect::<Vec<_>>(),
                TimestampSource::Upstream,
            ),
            _ => (
                interpolated_timestamps(duration, count),
                TimestampSource::Interpolated,
            ),
        };

        let uploaded: Vec<Option<StoredAsset>> = stream::iter(frames.into_iter().enumerate())
            .map(|(i, encoded)| self.upload_keyframe(id, i, encoded))
            .buffered(KEYFRAME_UPLOAD_CONCURRENCY)
            .collect()
            .await;

        let keyframes: Vec<Keyframe> = uploaded
            .into_iter()
            .zip(timestamps)
            .filter_map(|(asset, timestamp)| {
                asset.map(|asset| Keyframe {
                    asset,
                    timestamp,
                    timestamp_source: source,
                })
            })
            .collect();

        if keyframes.len() < count {
            tracing::warn!(
                analysis_id = %id,
                expected = count,
                stored = keyframes.len(),
                "Some keyframes were dropped"
            );
        }

        let analysis = Analysis {
            id,
            user: new.user,
            user_height_cm: new.user_height_cm,
            bike_type: new.bike_type,
            quality: Some(new.quality),
            storage_type: StorageType::S3,
            original_video: None,
            processed_video,
            keyframes,
            duration,
            max_angles: response.max_angles,
            min_angles: response.min_angles,
            body_lengths_cm: response.body_lengths_cm,
            recommendations: response.recommendations,
            created_at: DateTime::now(),
            updated_at: None,
        };

        if let Err(e) = self.db.insert_analysis(&analysis).await {
            tracing::error!(
                analysis_id = %id,
                error = %e,
                "Analysis insert failed; uploaded objects are orphaned"
            );
            return Err(e);
        }

        tracing::info!(
            analysis_id = %id,
            keyframes = analysis.keyframes.len(),
            duration = ?analysis.duration,
            "Analysis stored"
        );

        Ok(analysis)
    }

    async fn upload_keyframe(&self, id: ObjectId, index: usize, encoded: String) -> Option<StoredAsset> {
        let data = match decode_base64(&encoded) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(analysis_id = %id, index, error = %e, "Keyframe is not valid base64");
                return None;
            }
        };

        let key = AssetSlot::Keyframe(index).object_key(&id, "");
        match self.store.upload(Bytes::from(data), &key, IMAGE_JPEG).await {
            Ok(key) => Some(StoredAsset::s3(key, IMAGE_JPEG)),
            Err(e) => {
                tracing::warn!(analysis_id = %id, index, error = %e, "Keyframe upload failed");
                None
            }
        }
    }

    // ─── Resolve ─────────────────────────────────────────────────────────────

    /// URL for the asset in `slot`, migrating legacy local files on first read.
    pub async fn resolve(
        &self,
        analysis: &Analysis,
        slot: AssetSlot,
    ) -> Result<ResolvedUrl, AppError> {
        match analysis.asset(slot) {
            Some(StoredAsset::S3 { s3_key, .. }) => self.sign(s3_key).await,
            Some(StoredAsset::Local { .. }) => self.migrate(analysis.id, slot).await,
            None => Err(AppError::NotFound(format!("{} not available", slot))),
        }
    }

    async fn sign(&self, key: &str) -> Result<ResolvedUrl, AppError> {
        if let Some((url, remaining)) = self.url_cache.get(key) {
            return Ok(ResolvedUrl {
                url,
                expires_in: Some(remaining.as_secs()),
                legacy: false,
            });
        }

        let url = self
            .store
            .signed_url(key, self.url_ttl)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        self.url_cache.insert(key, url.clone(), self.url_ttl);

        Ok(ResolvedUrl {
            url,
            expires_in: Some(self.url_ttl.as_secs()),
            legacy: false,
        })
    }

    async fn migrate(&self, id: ObjectId, slot: AssetSlot) -> Result<ResolvedUrl, AppError> {
        let lock = self
            .migration_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.migrate_locked(id, slot).await
        };

        drop(lock);
        self.migration_locks
            .remove_if(&id, |_, m| Arc::strong_count(m) == 1);

        result
    }

    async fn migrate_locked(&self, id: ObjectId, slot: AssetSlot) -> Result<ResolvedUrl, AppError> {
        // Another reader may have migrated the slot while we waited.
        let mut current = self
            .db
            .get_analysis(&id)
            .await?
            .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;

        let file_path = match current.asset(slot) {
            Some(StoredAsset::S3 { s3_key, .. }) => {
                let key = s3_key.clone();
                return self.sign(&key).await;
            }
            Some(StoredAsset::Local { file_path }) => file_path.clone(),
            None => return Err(AppError::NotFound(format!("{} not available", slot))),
        };

        let relative = relative_upload_path(&file_path);
        let path = self.legacy_upload_dir.join(&relative);

        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    tracing::debug!(analysis_id = %id, path = %path.display(), "Legacy file not on this host");
                } else {
                    tracing::warn!(analysis_id = %id, path = %path.display(), error = %e, "Failed to read legacy file");
                }
                return Ok(self.static_fallback(&relative));
            }
        };

        let (ext, content_type) = match slot {
            AssetSlot::OriginalVideo => {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{}", e.to_ascii_lowercase()))
                    .unwrap_or_default();
                let content_type = video_content_type(&ext);
                (ext, content_type)
            }
            AssetSlot::ProcessedVideo => (String::new(), VIDEO_MP4),
            AssetSlot::Keyframe(_) => (String::new(), IMAGE_JPEG),
        };

        let key = slot.object_key(&id, &ext);
        self.store
            .upload(Bytes::from(data), &key, content_type)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        current.set_asset(slot, StoredAsset::s3(key.clone(), content_type));
        current.refresh_storage_type();
        current.updated_at = Some(DateTime::now());
        self.db.save_analysis(&current).await?;

        tracing::info!(
            analysis_id = %id,
            slot = %slot,
            key = %key,
            storage_type = ?current.storage_type,
            "Migrated legacy asset to object storage"
        );

        self.sign(&key).await
    }

    fn static_fallback(&self, relative: &str) -> ResolvedUrl {
        let encoded: Vec<_> = relative.split('/').map(urlencoding::encode).collect();
        ResolvedUrl {
            url: format!("{}/uploads/{}", self.public_base_url, encoded.join("/")),
            expires_in: None,
            legacy: true,
        }
    }

    // ─── Delete ──────────────────────────────────────────────────────────────

    /// Remove every stored object, then the document.
    ///
    /// Object and file removal is best effort; the document is deleted even
    /// when some of it fails.
    pub async fn delete(&self, analysis: &Analysis) -> Result<(), AppError> {
        let keys: Vec<&str> = analysis
            .assets()
            .filter_map(|(_, asset)| asset.s3_key())
            .collect();

        let results = future::join_all(keys.iter().map(|key| self.store.delete(key))).await;

        let mut failed = 0usize;
        for (key, result) in keys.iter().zip(results) {
            self.url_cache.invalidate(key);
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(analysis_id = %analysis.id, key, error = %e, "Object delete failed");
            }
        }

        for (_, asset) in analysis.assets() {
            if let StoredAsset::Local { file_path } = asset {
                let path = self.legacy_upload_dir.join(relative_upload_path(file_path));
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Legacy file delete failed")
                    }
                }
            }
        }

        if !self.db.delete_analysis(&analysis.id).await? {
            return Err(AppError::NotFound("Analysis not found".to_string()));
        }

        tracing::info!(
            analysis_id = %analysis.id,
            objects = keys.len(),
            failed,
            "Analysis deleted"
        );
        Ok(())
    }
}

/// Decode standard base64, tolerating a `data:<mime>;base64,` prefix and
/// embedded whitespace.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.find(";base64,") {
        Some(idx) if encoded.starts_with("data:") => &encoded[idx + ";base64,".len()..],
        _ => encoded,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(cleaned)
}

/// Path of a legacy `filePath` relative to the upload directory.
///
/// Legacy documents stored paths like `uploads/x.mp4`, `/app/uploads/x.mp4`
/// or bare file names. Parent and root components are dropped.
fn relative_upload_path(file_path: &str) -> String {
    let normalized = file_path.replace('\\', "/");
    let tail = match normalized.rfind("uploads/") {
        Some(idx) => &normalized[idx + "uploads/".len()..],
        None => normalized.as_str(),
    };

    Path::new(tail)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn video_content_type(ext: &str) -> &'static str {
    match ext {
        ".mov" => "video/quicktime",
        ".webm" => "video/webm",
        ".avi" => "video/x-msvideo",
        ".mkv" => "video/x-matroska",
        _ => VIDEO_MP4,
    }
}
