// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Best-effort video durations from `ffprobe`.

use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::process::Command;

/// Source of video durations.
#[async_trait]
pub trait DurationSource: Send + Sync {
    /// Duration in seconds, if it can be determined.
    async fn duration(&self, video: &[u8]) -> Option<f64>;
}

/// Runs `ffprobe` against in-memory video bytes.
///
/// Every failure mode (binary missing, unreadable container, garbage output)
/// yields `None`; callers treat the duration as unknown.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    binary: String,
}

impl Ffprobe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DurationSource for Ffprobe {
    async fn duration(&self, video: &[u8]) -> Option<f64> {
        if video.is_empty() {
            return None;
        }

        let file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create temp file for ffprobe");
                return None;
            }
        };
        if let Err(e) = tokio::fs::write(file.path(), video).await {
            tracing::warn!(error = %e, "Failed to write temp file for ffprobe");
            return None;
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(file.path())
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(binary = %self.binary, "ffprobe not installed; duration unknown");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to run ffprobe");
                return None;
            }
        };

        if !output.status.success() {
            tracing::warn!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffprobe failed"
            );
            return None;
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's bare `format=duration` output.
fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
