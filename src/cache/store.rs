//! Artifact cache storage
//!
//! `CacheStore` is the key-value seam the single-flight gate talks to, so an
//! external cache service can replace the in-process `MemoryStore` or the
//! on-disk `FileStore`.

use crate::cache::monitor::SourceMonitor;
use crate::fingerprint::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Combined, transformed output of a bundle request
pub type Artifact = Arc<str>;

/// An immutable cached artifact and the sources it was built from
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub artifact: Artifact,
    pub monitors: Vec<SourceMonitor>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: CacheKey, artifact: Artifact, monitors: Vec<SourceMonitor>) -> Self {
        Self {
            key,
            artifact,
            monitors,
            created_at: Utc::now(),
        }
    }

    /// Check if the entry is older than `max_age` (`None` = never expires)
    pub fn is_expired(&self, max_age: Option<Duration>) -> bool {
        match max_age {
            Some(age) => Utc::now() >= self.created_at + age,
            None => false,
        }
    }

    /// Check every recorded source against the filesystem
    pub async fn sources_unchanged(&self) -> bool {
        for monitor in &self.monitors {
            if !monitor.is_current().await {
                return false;
            }
        }
        true
    }
}

/// Abstract artifact store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch an entry if present
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;

    /// Insert or replace an entry
    async fn set(&self, entry: CacheEntry);

    /// Drop an entry
    async fn invalidate(&self, key: &CacheKey);

    /// Drop `entry` only if it is still the stored entry for its key, so an
    /// artifact republished in the meantime survives.
    async fn evict(&self, entry: &Arc<CacheEntry>) {
        if let Some(current) = self.get(&entry.key).await {
            if Arc::ptr_eq(&current, entry) {
                self.invalidate(&entry.key).await;
            }
        }
    }

    /// Drop every entry older than `max_age`, returning how many went
    async fn purge_expired(&self, max_age: Duration) -> usize;
}

/// In-process store backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `entry` if it is still the one stored under its key
    pub(crate) fn remove_if_current(&self, entry: &Arc<CacheEntry>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&entry.key) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                entries.remove(&entry.key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn insert(&self, entry: Arc<CacheEntry>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key, entry);
    }

    pub(crate) fn remove(&self, key: &CacheKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop expired entries, returning their keys
    pub(crate) fn retain_fresh(&self, max_age: Duration) -> Vec<CacheKey> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<CacheKey> = entries
            .values()
            .filter(|entry| entry.is_expired(Some(max_age)))
            .map(|entry| entry.key)
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn set(&self, entry: CacheEntry) {
        self.insert(Arc::new(entry));
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.remove(key);
    }

    async fn evict(&self, entry: &Arc<CacheEntry>) {
        self.remove_if_current(entry);
    }

    async fn purge_expired(&self, max_age: Duration) -> usize {
        self.retain_fresh(max_age).len()
    }
}
