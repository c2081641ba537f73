//! User account model for storage and API.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Account role. Admin routes accept `Admin` and `SuperAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Self-reported riding experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
    Professional,
}

/// User profile stored in MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    /// Lower-cased; unique across accounts
    pub email: String,
    /// bcrypt hash
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub experience: Option<Experience>,
    #[serde(default)]
    pub email_verified: bool,
    /// SHA-256 (hex) of the outstanding email verification token
    #[serde(default)]
    pub verification_token_hash: Option<String>,
    pub created_at: DateTime,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}
