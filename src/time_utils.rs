// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a stored BSON date (Mongoose `timestamps`) for API responses.
pub fn format_bson_rfc3339(date: mongodb::bson::DateTime) -> String {
    let utc = DateTime::from_timestamp_millis(date.timestamp_millis()).unwrap_or_default();
    format_utc_rfc3339(utc)
}
