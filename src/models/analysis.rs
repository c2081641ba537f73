// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analysis record: one uploaded video's pose results plus derived assets.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat numeric map produced by the analysis service (angles, lengths).
pub type MeasurementMap = BTreeMap<String, f64>;

/// Bike geometry the rider wants recommendations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BikeType {
    #[default]
    Road,
    Mountain,
    Hybrid,
}

impl BikeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BikeType::Road => "road",
            BikeType::Mountain => "mountain",
            BikeType::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for BikeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "road" => Ok(BikeType::Road),
            "mountain" | "mtb" => Ok(BikeType::Mountain),
            "hybrid" => Ok(BikeType::Hybrid),
            other => Err(format!("Unsupported bike type: {}", other)),
        }
    }
}

/// Where an analysis' assets live. Only ever moves from `Local` to `S3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    #[default]
    S3,
}

/// A stored binary asset in either the current or the legacy layout.
///
/// Serialized untagged so both `{s3Key, contentType}` and `{filePath}`
/// documents read back. `S3` is listed first: a legacy document that still
/// carries a stale `filePath` next to an `s3Key` resolves to S3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredAsset {
    #[serde(rename_all = "camelCase")]
    S3 { s3_key: String, content_type: String },
    #[serde(rename_all = "camelCase")]
    Local { file_path: String },
}

impl StoredAsset {
    pub fn s3(key: impl Into<String>, content_type: impl Into<String>) -> Self {
        StoredAsset::S3 {
            s3_key: key.into(),
            content_type: content_type.into(),
        }
    }

    /// S3 key, if the asset has been moved to object storage.
    pub fn s3_key(&self) -> Option<&str> {
        match self {
            StoredAsset::S3 { s3_key, .. } => Some(s3_key),
            StoredAsset::Local { .. } => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StoredAsset::Local { .. })
    }
}

/// How a keyframe timestamp was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Reported by the analysis service.
    Upstream,
    /// `index * duration / count`; not a measured frame position.
    #[default]
    Interpolated,
}

/// A still extracted from the processed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    #[serde(flatten)]
    pub asset: StoredAsset,
    /// Seconds into the video; `None` when the duration is unknown
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub timestamp_source: TimestampSource,
}

/// Stored analysis document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Owner
    pub user: ObjectId,
    pub user_height_cm: f64,
    #[serde(default)]
    pub bike_type: BikeType,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default = "legacy_storage_type")]
    pub storage_type: StorageType,
    #[serde(default)]
    pub original_video: Option<StoredAsset>,
    #[serde(default)]
    pub processed_video: Option<StoredAsset>,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub max_angles: MeasurementMap,
    #[serde(default)]
    pub min_angles: MeasurementMap,
    #[serde(default)]
    pub body_lengths_cm: MeasurementMap,
    #[serde(default)]
    pub recommendations: serde_json::Value,
    pub created_at: DateTime,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

// Documents written before storageType existed are legacy local records.
fn legacy_storage_type() -> StorageType {
    StorageType::Local
}

/// Addressable asset slot on an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    OriginalVideo,
    ProcessedVideo,
    Keyframe(usize),
}

impl AssetSlot {
    /// Object key for this slot under the analysis prefix.
    ///
    /// `ext` only applies to the original upload, whose container varies.
    pub fn object_key(&self, analysis_id: &ObjectId, ext: &str) -> String {
        match self {
            AssetSlot::OriginalVideo => format!("videos/{}/original{}", analysis_id.to_hex(), ext),
            AssetSlot::ProcessedVideo => format!("videos/{}/processed.mp4", analysis_id.to_hex()),
            AssetSlot::Keyframe(i) => format!("videos/{}/keyframe_{}.jpg", analysis_id.to_hex(), i),
        }
    }
}

impl std::fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetSlot::OriginalVideo => write!(f, "original video"),
            AssetSlot::ProcessedVideo => write!(f, "processed video"),
            AssetSlot::Keyframe(i) => write!(f, "keyframe {}", i),
        }
    }
}

impl Analysis {
    /// Borrow the asset in a slot, if present.
    pub fn asset(&self, slot: AssetSlot) -> Option<&StoredAsset> {
        match slot {
            AssetSlot::OriginalVideo => self.original_video.as_ref(),
            AssetSlot::ProcessedVideo => self.processed_video.as_ref(),
            AssetSlot::Keyframe(i) => self.keyframes.get(i).map(|k| &k.asset),
        }
    }

    /// Replace the asset in a slot. Returns false when the slot does not exist.
    pub fn set_asset(&mut self, slot: AssetSlot, asset: StoredAsset) -> bool {
        match slot {
            AssetSlot::OriginalVideo => self.original_video = Some(asset),
            AssetSlot::ProcessedVideo => self.processed_video = Some(asset),
            AssetSlot::Keyframe(i) => match self.keyframes.get_mut(i) {
                Some(frame) => frame.asset = asset,
                None => return false,
            },
        }
        true
    }

    /// Every asset on the record, in slot order.
    pub fn assets(&self) -> impl Iterator<Item = (AssetSlot, &StoredAsset)> {
        self.original_video
            .iter()
            .map(|a| (AssetSlot::OriginalVideo, a))
            .chain(
                self.processed_video
                    .iter()
                    .map(|a| (AssetSlot::ProcessedVideo, a)),
            )
            .chain(
                self.keyframes
                    .iter()
                    .enumerate()
                    .map(|(i, k)| (AssetSlot::Keyframe(i), &k.asset)),
            )
    }

    pub fn has_local_assets(&self) -> bool {
        self.assets().any(|(_, asset)| asset.is_local())
    }

    /// Mark the record as S3-backed once nothing local is left.
    ///
    /// Never moves a record back to `Local`.
    pub fn refresh_storage_type(&mut self) {
        if self.storage_type == StorageType::Local && !self.has_local_assets() {
            self.storage_type = StorageType::S3;
        }
    }
}

/// Linear keyframe timestamps: `i * duration / count`.
///
/// An approximation: frames are assumed evenly spaced across the video.
pub fn interpolated_timestamps(duration: Option<f64>, count: usize) -> Vec<Option<f64>> {
    match duration {
        Some(d) if d.is_finite() && d >= 0.0 && count > 0 => {
            let step = d / count as f64;
            (0..count).map(|i| Some(i as f64 * step)).collect()
        }
        _ => vec![None; count],
    }
}
