// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded in-memory cache of presigned URLs, keyed by object key.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cached URLs are not handed out when they expire within this margin.
const REUSE_MARGIN: Duration = Duration::from_secs(60);

struct CachedUrl {
    url: String,
    expires_at: Instant,
    last_used: u64,
}

/// LRU + TTL cache shared across requests.
pub struct SignedUrlCache {
    entries: DashMap<String, CachedUrl>,
    capacity: usize,
    clock: AtomicU64,
}

impl SignedUrlCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// A fresh URL for `key` and its remaining lifetime.
    pub fn get(&self, key: &str) -> Option<(String, Duration)> {
        let now = Instant::now();
        let hit = {
            let mut entry = self.entries.get_mut(key)?;
            if now + REUSE_MARGIN < entry.expires_at {
                entry.last_used = self.tick();
                Some((entry.url.clone(), entry.expires_at - now))
            } else {
                None
            }
        };

        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    /// Remember a URL issued now with lifetime `ttl`.
    pub fn insert(&self, key: &str, url: String, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }

        self.entries.insert(
            key.to_string(),
            CachedUrl {
                url,
                expires_at: Instant::now() + ttl,
                last_used: self.tick(),
            },
        );

        while self.entries.len() > self.capacity {
            if !self.evict_one() {
                break;
            }
        }
    }

    /// Drop the URL for a key whose object moved or was deleted.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Expired entries go first, then the least recently used one.
    fn evict_one(&self) -> bool {
        let now = Instant::now();
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| (e.expires_at > now, e.last_used))
            .map(|e| e.key().clone());

        match victim {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }
}
