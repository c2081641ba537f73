// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod artifacts;
pub mod ffprobe;
pub mod object_store;
pub mod pose_client;
pub mod url_cache;

pub use artifacts::{ArtifactService, NewAnalysis, ResolvedUrl};
pub use ffprobe::{DurationSource, Ffprobe};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use pose_client::{PoseAnalysisClient, PoseAnalysisRequest, PoseAnalysisResponse};
pub use url_cache::SignedUrlCache;
