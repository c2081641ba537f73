// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MongoDB client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (accounts and profiles)
//! - Analyses (pose results and asset pointers)
//! - Contacts and newsletter subscriptions

use crate::db::{collections, Database};
use crate::error::AppError;
use crate::models::{Analysis, Contact, NewsletterSubscription, User};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::de::DeserializeOwned;

const DEFAULT_DATABASE: &str = "cyclofit";

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

fn db_error(e: mongodb::error::Error) -> AppError {
    AppError::Database(e.to_string())
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

/// MongoDB database client.
#[derive(Clone)]
pub struct MongoDb {
    db: mongodb::Database,
}

impl MongoDb {
    /// Connect and verify the server answers.
    ///
    /// The database name comes from `database`, then from the URI, then
    /// defaults to `cyclofit`.
    pub async fn connect(uri: &str, database: Option<&str>) -> Result<Self, AppError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let db = match database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AppError::Database(format!("MongoDB ping failed: {}", e)))?;

        tracing::info!(database = db.name(), "Connected to MongoDB");

        Ok(Self { db })
    }

    /// Create the indexes the queries rely on. Idempotent.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        let unique = IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await
            .map_err(db_error)?;

        self.analyses()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .map_err(db_error)?;

        self.newsletters()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique)
                    .build(),
            )
            .await
            .map_err(db_error)?;

        tracing::debug!("MongoDB indexes ensured");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(collections::USERS)
    }

    fn analyses(&self) -> Collection<Analysis> {
        self.db.collection(collections::ANALYSES)
    }

    fn contacts(&self) -> Collection<Contact> {
        self.db.collection(collections::CONTACTS)
    }

    fn newsletters(&self) -> Collection<NewsletterSubscription> {
        self.db.collection(collections::NEWSLETTERS)
    }

    async fn find_all<T>(
        collection: Collection<T>,
        filter: Document,
        sort: Document,
    ) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        collection
            .find(filter)
            .sort(sort)
            .await
            .map_err(db_error)?
            .try_collect()
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl Database for MongoDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<bool, AppError> {
        match self.users().insert_one(user).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(db_error(e)),
        }
    }

    async fn get_user(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        self.users()
            .find_one(doc! { "_id": id })
            .await
            .map_err(db_error)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.users()
            .find_one(doc! { "email": email })
            .await
            .map_err(db_error)
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError> {
        self.users()
            .find_one(doc! { "verificationTokenHash": token_hash })
            .await
            .map_err(db_error)
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        self.users()
            .replace_one(doc! { "_id": user.id }, user)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Self::find_all(self.users(), doc! {}, doc! { "createdAt": -1 }).await
    }

    // ─── Analysis Operations ─────────────────────────────────────

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        self.analyses().insert_one(analysis).await.map_err(db_error)?;
        Ok(())
    }

    async fn get_analysis(&self, id: &ObjectId) -> Result<Option<Analysis>, AppError> {
        self.analyses()
            .find_one(doc! { "_id": id })
            .await
            .map_err(db_error)
    }

    async fn list_analyses_for_user(&self, user: &ObjectId) -> Result<Vec<Analysis>, AppError> {
        Self::find_all(
            self.analyses(),
            doc! { "user": user },
            doc! { "createdAt": -1 },
        )
        .await
    }

    async fn list_analyses(&self) -> Result<Vec<Analysis>, AppError> {
        Self::find_all(self.analyses(), doc! {}, doc! { "createdAt": -1 }).await
    }

    async fn save_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        let result = self
            .analyses()
            .replace_one(doc! { "_id": analysis.id }, analysis)
            .await
            .map_err(db_error)?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Analysis {} not found",
                analysis.id.to_hex()
            )));
        }
        Ok(())
    }

    async fn delete_analysis(&self, id: &ObjectId) -> Result<bool, AppError> {
        let result = self
            .analyses()
            .delete_one(doc! { "_id": id })
            .await
            .map_err(db_error)?;
        Ok(result.deleted_count > 0)
    }

    // ─── Contact & Newsletter Operations ─────────────────────────

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        self.contacts().insert_one(contact).await.map_err(db_error)?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError> {
        Self::find_all(self.contacts(), doc! {}, doc! { "createdAt": -1 }).await
    }

    async fn subscribe_newsletter(
        &self,
        subscription: &NewsletterSubscription,
    ) -> Result<bool, AppError> {
        let result = match self
            .newsletters()
            .update_one(
                doc! { "email": &subscription.email },
                doc! {
                    "$setOnInsert": {
                        "_id": subscription.id,
                        "email": &subscription.email,
                        "subscribedAt": subscription.subscribed_at,
                    }
                },
            )
            .upsert(true)
            .await
        {
            Ok(result) => result,
            // Lost a concurrent upsert race for the same email
            Err(e) if is_duplicate_key(&e) => return Ok(false),
            Err(e) => return Err(db_error(e)),
        };
        Ok(result.upserted_id.is_some())
    }

    async fn list_newsletter_subscriptions(
        &self,
    ) -> Result<Vec<NewsletterSubscription>, AppError> {
        Self::find_all(self.newsletters(), doc! {}, doc! { "subscribedAt": -1 }).await
    }
}
