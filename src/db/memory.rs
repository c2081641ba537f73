// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory database for tests and offline development.
//!
//! Mirrors the MongoDB semantics the application relies on: unique emails,
//! newest-first listings, replace-by-id saves.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Analysis, Contact, NewsletterSubscription, User};
use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Collections {
    users: HashMap<ObjectId, User>,
    analyses: HashMap<ObjectId, Analysis>,
    contacts: Vec<Contact>,
    newsletters: Vec<NewsletterSubscription>,
}

/// Process-local database; cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        // A panicking writer cannot leave a half-applied document behind.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl Database for MemoryDb {
    async fn insert_user(&self, user: &User) -> Result<bool, AppError> {
        let mut c = self.lock();
        if c.users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }
        c.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn get_user(&self, id: &ObjectId) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.verification_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        self.lock().users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let users = self.lock().users.values().cloned().collect();
        Ok(newest_first(users, |u: &User| u.created_at))
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        self.lock().analyses.insert(analysis.id, analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: &ObjectId) -> Result<Option<Analysis>, AppError> {
        Ok(self.lock().analyses.get(id).cloned())
    }

    async fn list_analyses_for_user(&self, user: &ObjectId) -> Result<Vec<Analysis>, AppError> {
        let analyses = self
            .lock()
            .analyses
            .values()
            .filter(|a| &a.user == user)
            .cloned()
            .collect();
        Ok(newest_first(analyses, |a: &Analysis| a.created_at))
    }

    async fn list_analyses(&self) -> Result<Vec<Analysis>, AppError> {
        let analyses = self.lock().analyses.values().cloned().collect();
        Ok(newest_first(analyses, |a: &Analysis| a.created_at))
    }

    async fn save_analysis(&self, analysis: &Analysis) -> Result<(), AppError> {
        let mut c = self.lock();
        match c.analyses.get_mut(&analysis.id) {
            Some(stored) => {
                *stored = analysis.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Analysis {} not found",
                analysis.id.to_hex()
            ))),
        }
    }

    async fn delete_analysis(&self, id: &ObjectId) -> Result<bool, AppError> {
        Ok(self.lock().analyses.remove(id).is_some())
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        self.lock().contacts.push(contact.clone());
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, AppError> {
        let contacts = self.lock().contacts.clone();
        Ok(newest_first(contacts, |c: &Contact| c.created_at))
    }

    async fn subscribe_newsletter(
        &self,
        subscription: &NewsletterSubscription,
    ) -> Result<bool, AppError> {
        let mut c = self.lock();
        if c.newsletters.iter().any(|s| s.email == subscription.email) {
            return Ok(false);
        }
        c.newsletters.push(subscription.clone());
        Ok(true)
    }

    async fn list_newsletter_subscriptions(
        &self,
    ) -> Result<Vec<NewsletterSubscription>, AppError> {
        let subs = self.lock().newsletters.clone();
        Ok(newest_first(subs, |s: &NewsletterSubscription| {
            s.subscribed_at
        }))
    }
}
