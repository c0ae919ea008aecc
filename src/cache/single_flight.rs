//! Single-flight artifact cache
//!
//! `BundleCache` guarantees at most one build per cache key at any instant.
//! Callers asking for a key that is already being built join that build and
//! receive its outcome, success or failure. Builds for different keys never
//! wait on each other.

use crate::cache::monitor::SourceMonitor;
use crate::cache::store::{Artifact, CacheEntry, CacheStore, MemoryStore};
use crate::error::{BundleError, BundleResult};
use crate::fingerprint::CacheKey;
use chrono::Duration;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info};

/// Minimum time between two sweeps of expired entries
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

/// Output of a successful build, before it is published to the store
#[derive(Debug, Clone)]
pub struct Built {
    /// Final artifact text
    pub artifact: String,
    /// One monitor per local file read during the build
    pub monitors: Vec<SourceMonitor>,
}

type PendingBuild = Shared<BoxFuture<'static, BundleResult<Artifact>>>;

struct CacheState {
    store: Arc<dyn CacheStore>,
    max_age: Option<Duration>,
    pending: Mutex<HashMap<CacheKey, PendingBuild>>,
    last_sweep: Mutex<Option<Instant>>,
}

/// Cache store guarded by a per-key single-flight gate
pub struct BundleCache {
    state: Arc<CacheState>,
}

impl BundleCache {
    /// Wrap a store; `expiration_days = 0` disables age-based expiry
    pub fn new(store: Arc<dyn CacheStore>, expiration_days: u32) -> Self {
        let max_age = (expiration_days > 0).then(|| Duration::days(i64::from(expiration_days)));
        Self {
            state: Arc::new(CacheState {
                store,
                max_age,
                pending: Mutex::new(HashMap::new()),
                last_sweep: Mutex::new(None),
            }),
        }
    }

    /// Cache backed by an in-process `MemoryStore`
    pub fn in_memory(expiration_days: u32) -> Self {
        Self::new(Arc::new(MemoryStore::new()), expiration_days)
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.state.store
    }

    /// Number of builds currently in flight
    pub fn pending_builds(&self) -> usize {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop a cached artifact so the next request rebuilds it
    pub async fn invalidate(&self, key: &CacheKey) {
        self.state.store.invalidate(key).await;
    }

    /// Remove every expired entry from the store now, returning how many
    /// were dropped. Publishing a build also sweeps, at most once every
    /// 15 minutes.
    pub async fn purge_expired(&self) -> usize {
        match self.state.max_age {
            Some(max_age) => self.state.store.purge_expired(max_age).await,
            None => 0,
        }
    }

    /// Return the live artifact for `key`, or run `build` to produce it.
    ///
    /// Concurrent callers for the same key share one execution of `build`.
    /// A failed build is delivered to every waiter and nothing is cached.
    /// A build that panics is reported as `BundleError::Internal`.
    pub async fn get_or_build<F, Fut>(&self, key: CacheKey, build: F) -> BundleResult<Artifact>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BundleResult<Built>> + Send + 'static,
    {
        if let Some(artifact) = self.state.lookup_live(&key).await {
            debug!("Cache hit for {}", key.short());
            return Ok(artifact);
        }

        let pending = {
            let mut pending = self
                .state
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match pending.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight build for {}", key.short());
                    existing.clone()
                }
                None => {
                    let build = run_build(Arc::clone(&self.state), key, build)
                        .boxed()
                        .shared();
                    pending.insert(key, build.clone());
                    build
                }
            }
        };

        pending.await
    }
}

impl CacheState {
    /// Fetch an entry and verify it is neither expired nor built from
    /// changed sources. Dead entries are evicted on the way out.
    async fn lookup_live(&self, key: &CacheKey) -> Option<Artifact> {
        let entry = self.store.get(key).await?;

        if entry.is_expired(self.max_age) {
            debug!("Cached artifact {} expired", key.short());
            self.store.evict(&entry).await;
            return None;
        }

        if !entry.sources_unchanged().await {
            info!("Sources changed, evicting cached artifact {}", key.short());
            self.store.evict(&entry).await;
            return None;
        }

        Some(Arc::clone(&entry.artifact))
    }

    async fn sweep_if_due(&self) {
        let Some(max_age) = self.max_age else {
            return;
        };
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| at.elapsed() < SWEEP_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }

        let removed = self.store.purge_expired(max_age).await;
        if removed > 0 {
            info!("Swept {} expired artifact(s)", removed);
        }
    }
}

/// Frees a key's build slot when its build finishes, fails or unwinds
struct PendingSlot {
    state: Arc<CacheState>,
    key: CacheKey,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

async fn run_build<F, Fut>(
    state: Arc<CacheState>,
    key: CacheKey,
    build: F,
) -> BundleResult<Artifact>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = BundleResult<Built>> + Send + 'static,
{
    let _slot = PendingSlot {
        state: Arc::clone(&state),
        key,
    };

    let attempt = async {
        // A build for this key may have been published between our miss and
        // taking the build slot.
        if let Some(artifact) = state.lookup_live(&key).await {
            return Ok(artifact);
        }

        let built = build().await?;
        let artifact: Artifact = Arc::from(built.artifact);
        state
            .store
            .set(CacheEntry::new(key, Arc::clone(&artifact), built.monitors))
            .await;
        state.sweep_if_due().await;
        Ok(artifact)
    };

    AssertUnwindSafe(attempt)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!("Build for {} panicked: {}", key.short(), message);
            Err(BundleError::Internal(format!("bundle build panicked: {}", message)))
        })
}

fn panic_message(panic: &(dyn Any + Send + 'static)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
