//! On-disk artifact store
//!
//! Each entry is two files named after the cache key: `<key>.bundle` holds
//! the artifact text and `<key>.json` its creation time and source monitors.
//! The sidecar is written last, so a bundle file without one is never
//! served. Entries read from disk stay in memory afterwards.

use crate::cache::monitor::SourceMonitor;
use crate::cache::store::{CacheEntry, CacheStore, MemoryStore};
use crate::fingerprint::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const ARTIFACT_EXT: &str = "bundle";
const SIDECAR_EXT: &str = "json";

/// Metadata persisted next to each artifact
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    created_at: DateTime<Utc>,
    monitors: Vec<SourceMonitor>,
}

/// Store that keeps built bundles on disk so they outlive the process
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    /// Store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: MemoryStore::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, ARTIFACT_EXT))
    }

    fn sidecar_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, SIDECAR_EXT))
    }

    async fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        let stem = key.to_string();
        let raw = match tokio::fs::read(self.sidecar_path(&stem)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read cached bundle {}: {}", key.short(), e);
                return None;
            }
        };

        let sidecar: Sidecar = match serde_json::from_slice(&raw) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Discarding unreadable cached bundle {}: {}", key.short(), e);
                self.remove_files(&stem).await;
                return None;
            }
        };

        let artifact = match tokio::fs::read_to_string(self.artifact_path(&stem)).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Discarding incomplete cached bundle {}: {}", key.short(), e);
                self.remove_files(&stem).await;
                return None;
            }
        };

        debug!("Loaded cached bundle {} from disk", key.short());
        Some(CacheEntry {
            key: *key,
            artifact: Arc::from(artifact),
            monitors: sidecar.monitors,
            created_at: sidecar.created_at,
        })
    }

    async fn persist(&self, entry: &CacheEntry) -> std::io::Result<()> {
        let stem = entry.key.to_string();
        let sidecar = serde_json::to_vec(&Sidecar {
            created_at: entry.created_at,
            monitors: entry.monitors.clone(),
        })
        .map_err(std::io::Error::other)?;

        tokio::fs::create_dir_all(&self.dir).await?;

        // The old sidecar must not describe the new artifact
        let sidecar_path = self.sidecar_path(&stem);
        remove_if_present(&sidecar_path).await?;

        let artifact_path = self.artifact_path(&stem);
        let staging = artifact_path.with_extension("bundle.tmp");
        tokio::fs::write(&staging, entry.artifact.as_bytes()).await?;
        tokio::fs::rename(&staging, &artifact_path).await?;

        let staging = sidecar_path.with_extension("json.tmp");
        tokio::fs::write(&staging, sidecar).await?;
        tokio::fs::rename(&staging, &sidecar_path).await
    }

    async fn remove_files(&self, stem: &str) {
        for path in [self.sidecar_path(stem), self.artifact_path(stem)] {
            if let Err(e) = remove_if_present(&path).await {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    /// Stems of on-disk entries older than `max_age`, or unreadable
    async fn expired_on_disk(&self, max_age: Duration) -> Vec<String> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to scan {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut expired = Vec::new();
        while let Ok(Some(file)) = dir.next_entry().await {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let stale = match tokio::fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<Sidecar>(&raw) {
                    Ok(sidecar) => now >= sidecar.created_at + max_age,
                    Err(_) => true,
                },
                Err(_) => false,
            };
            if stale {
                expired.push(stem.to_string());
            }
        }
        expired
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.memory.get(key).await {
            return Some(entry);
        }

        let entry = Arc::new(self.load(key).await?);
        self.memory.insert(Arc::clone(&entry));
        Some(entry)
    }

    async fn set(&self, entry: CacheEntry) {
        if let Err(e) = self.persist(&entry).await {
            warn!(
                "Failed to persist bundle {} to {}: {}",
                entry.key.short(),
                self.dir.display(),
                e
            );
        }
        self.memory.insert(Arc::new(entry));
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.memory.remove(key);
        self.remove_files(&key.to_string()).await;
    }

    async fn evict(&self, entry: &Arc<CacheEntry>) {
        if self.memory.remove_if_current(entry) {
            self.remove_files(&entry.key.to_string()).await;
        }
    }

    async fn purge_expired(&self, max_age: Duration) -> usize {
        let mut removed: HashSet<String> = self
            .memory
            .retain_fresh(max_age)
            .iter()
            .map(CacheKey::to_string)
            .collect();

        for stem in self.expired_on_disk(max_age).await {
            self.remove_files(&stem).await;
            removed.insert(stem);
        }
        removed.len()
    }
}
