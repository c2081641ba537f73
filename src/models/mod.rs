// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod analysis;
pub mod contact;
pub mod user;

pub use analysis::{
    Analysis, AssetSlot, BikeType, Keyframe, MeasurementMap, StorageType, StoredAsset,
    TimestampSource,
};
pub use contact::{Contact, NewsletterSubscription};
pub use user::{Experience, Role, User};
