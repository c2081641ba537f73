// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! CycloFit: bike fit analysis from riding videos
//!
//! This crate provides the backend API that forwards rider videos to the
//! pose analysis service, stores the results and derived media, and serves
//! them back through short-lived signed URLs.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{ArtifactService, PoseAnalysisClient};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Database>,
    pub pose_client: PoseAnalysisClient,
    pub artifacts: ArtifactService,
}
