//! Database layer (MongoDB).

pub mod memory;
pub mod mongo;

pub use memory::MemoryDb;
pub use mongo::MongoDb;

use crate::error::AppError;
use crate::models::{Analysis, Contact, NewsletterSubscription, User};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ANALYSES: &str = "analyses";
    pub const CONTACTS: &str = "contacts";
    pub const NEWSLETTERS: &str = "newsletters";
}

/// Typed document operations used by the services and routes.
#[async_trait]
pub trait Database: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    /// `false` when the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<bool, AppError>;
    async fn get_user(&self, id: &ObjectId) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError>;
    async fn update_user(&self, user: &User) -> Result<(), AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    // ─── Analyses ────────────────────────────────────────────────

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError>;
    async fn get_analysis(&self, id: &ObjectId) -> Result<Option<Analysis>, AppError>;
    /// Analyses owned by `user`, newest first.
    async fn list_analyses_for_user(&self, user: &ObjectId) -> Result<Vec<Analysis>, AppError>;
    /// All analyses, newest first.
    async fn list_analyses(&self) -> Result<Vec<Analysis>, AppError>;
    /// Replace a stored analysis with the given version.
    async fn save_analysis(&self, analysis: &Analysis) -> Result<(), AppError>;
    /// Returns false when nothing was deleted.
    async fn delete_analysis(&self, id: &ObjectId) -> Result<bool, AppError>;

    // ─── Contact & Newsletter ────────────────────────────────────

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError>;
    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError>;
    /// Returns true when the email was not subscribed before.
    async fn subscribe_newsletter(
        &self,
        subscription: &NewsletterSubscription,
    ) -> Result<bool, AppError>;
    async fn list_newsletter_subscriptions(&self)
        -> Result<Vec<NewsletterSubscription>, AppError>;
}
