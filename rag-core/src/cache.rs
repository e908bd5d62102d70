//! Content-addressed cache of generated answers.
//!
//! Keys are the SHA-256 of the raw query text, with no normalization: two
//! queries that differ only in case or whitespace are cached separately.
//! Entries live as long as the cache and are never evicted.

use std::collections::HashMap;
use std::future::Future;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Derive the cache key for a raw query string (lowercase hex SHA-256).
pub fn cache_key(query: &str) -> String {
    format!("{:x}", Sha256::digest(query.as_bytes()))
}

/// Process-lifetime memo of answers keyed by query hash.
///
/// Concurrent misses on the same key may each compute an answer; the last
/// one written wins.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, String>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached answer for `query`, or compute, store, and return it.
    ///
    /// `compute` is not called on a hit. Errors from `compute` are returned
    /// unchanged and nothing is stored.
    pub async fn get_or_compute<F, Fut>(&self, query: &str, compute: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let key = cache_key(query);
        if let Some(answer) = self.entries.read().await.get(&key) {
            debug!(cache_key = %key, "response cache hit");
            return Ok(answer.clone());
        }

        debug!(cache_key = %key, "response cache miss");
        let answer = compute().await?;
        self.entries.write().await.insert(key, answer.clone());
        Ok(answer)
    }

    pub async fn get(&self, query: &str) -> Option<String> {
        self.entries.read().await.get(&cache_key(query)).cloned()
    }

    pub async fn contains(&self, query: &str) -> bool {
        self.entries.read().await.contains_key(&cache_key(query))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
