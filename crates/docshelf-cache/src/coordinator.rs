//! Tag-invalidated read-through cache.
//!
//! Every tagged entry is stored as an envelope carrying the generation of
//! each of its tags, read *before* the value was computed. `invalidate`
//! bumps the generation counters of its tags, so any entry computed against
//! an older generation no longer matches and is treated as a miss. A value
//! computed while an invalidation was in flight therefore never outlives
//! that invalidation.
//!
//! When a bump cannot reach the store, the tag is kept in a local pending
//! set. Reads touching a pending tag skip the cache (and retry the bump)
//! until a bump succeeds.
//!
//! The pending set belongs to one process. Other replicas sharing the same
//! Redis keep serving their tagged entries until some bump reaches the
//! store, or until the entries expire after their TTL. `fast_path` entries
//! carry no tags and are stale for at most their own TTL.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docshelf_core::{CacheStore, Result};

use crate::config::CacheConfig;
use crate::keys::{canonical_tags, CacheKey, CacheTag};
use crate::memory_store::MemoryCacheStore;
use crate::redis_store::RedisCacheStore;
use crate::stats::{CacheStats, StatsCounters};

#[derive(Serialize, Deserialize)]
struct Envelope {
    gens: Vec<u64>,
    value: serde_json::Value,
}

/// Read-through cache coordinator.
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: Option<Arc<dyn CacheStore>>,
    config: CacheConfig,
    pending: Mutex<BTreeSet<CacheTag>>,
    stats: StatsCounters,
}

fn tag_names(tags: &[CacheTag]) -> Vec<&'static str> {
    tags.iter().map(|t| t.as_str()).collect()
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self::build(Some(store), config)
    }

    /// A coordinator with no store: every read computes.
    pub fn disabled() -> Self {
        Self::build(None, CacheConfig::default())
    }

    fn build(store: Option<Arc<dyn CacheStore>>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                config,
                pending: Mutex::new(BTreeSet::new()),
                stats: StatsCounters::default(),
            }),
        }
    }

    /// Connect the configured store. An unreachable Redis falls back to the
    /// in-process store.
    pub async fn from_config(config: CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> = if config.redis_enabled {
            match RedisCacheStore::connect(&config.redis_url).await {
                Ok(store) => {
                    info!(
                        subsystem = "cache",
                        op = "connect",
                        url = %config.redacted_url(),
                        ttl_secs = config.default_ttl.as_secs(),
                        "Redis cache enabled"
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(
                        subsystem = "cache",
                        op = "connect",
                        error = %e,
                        "Failed to connect to Redis, using in-process cache"
                    );
                    Arc::new(MemoryCacheStore::new(config.memory_capacity))
                }
            }
        } else {
            info!(
                subsystem = "cache",
                op = "connect",
                capacity = config.memory_capacity,
                "Redis disabled via REDIS_ENABLED=false, using in-process cache"
            );
            Arc::new(MemoryCacheStore::new(config.memory_capacity))
        };
        Self::new(store, config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    pub fn store_name(&self) -> &str {
        self.inner.store.as_ref().map(|s| s.name()).unwrap_or("none")
    }

    /// True when `user` is the configured diagnostic identity.
    pub fn is_bypass_user(&self, user: Uuid) -> bool {
        self.inner.config.bypass_user == Some(user)
    }

    /// Tags awaiting a successful generation bump.
    pub async fn pending_tags(&self) -> Vec<CacheTag> {
        self.inner.pending.lock().await.iter().copied().collect()
    }

    /// Serve `key` if a valid entry exists, otherwise run `compute` and store
    /// its result under `tags` for `ttl`.
    ///
    /// Errors from `compute` propagate and nothing is stored. Store errors are
    /// treated as a miss.
    pub async fn read_through<T, F, Fut>(
        &self,
        key: &CacheKey,
        tags: &[CacheTag],
        ttl: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(store) = self.inner.store.as_ref() else {
            return compute().await;
        };
        if ttl.is_zero() {
            return compute().await;
        }

        let tags = canonical_tags(tags);
        if self.touches_pending(&tags).await && !self.flush_pending().await {
            self.inner.stats.bypass();
            debug!(
                subsystem = "cache",
                op = "read_through",
                namespace = key.namespace(),
                "Pending invalidation, bypassing cache"
            );
            return compute().await;
        }

        let names = tag_names(&tags);
        let gens = match store.generations(&names).await {
            Ok(gens) => gens,
            Err(e) => {
                self.inner.stats.error();
                warn!(subsystem = "cache", op = "generations", error = %e, "Cache read failed");
                return compute().await;
            }
        };

        let storage_key = key.to_key();
        match store.get(&storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Envelope>(&raw) {
                Ok(envelope) if envelope.gens == gens => {
                    match serde_json::from_value::<T>(envelope.value) {
                        Ok(value) => {
                            self.inner.stats.hit();
                            debug!(
                                subsystem = "cache",
                                op = "read_through",
                                namespace = key.namespace(),
                                "Cache hit"
                            );
                            return Ok(value);
                        }
                        Err(e) => {
                            warn!(subsystem = "cache", error = %e, "Failed to decode cached value");
                        }
                    }
                }
                Ok(_) => {
                    debug!(
                        subsystem = "cache",
                        op = "read_through",
                        namespace = key.namespace(),
                        "Cached entry is from an older generation"
                    );
                }
                Err(e) => {
                    warn!(subsystem = "cache", error = %e, "Failed to decode cache envelope");
                }
            },
            Ok(None) => {}
            Err(e) => {
                self.inner.stats.error();
                warn!(subsystem = "cache", op = "get", error = %e, "Cache read failed");
            }
        }

        self.inner.stats.miss();
        let value = compute().await?;

        match serde_json::to_value(&value) {
            Ok(json) => {
                let envelope = Envelope { gens, value: json };
                match serde_json::to_string(&envelope) {
                    Ok(raw) => {
                        if let Err(e) = store.set(&storage_key, raw, ttl).await {
                            self.inner.stats.error();
                            warn!(subsystem = "cache", op = "set", error = %e, "Cache write failed");
                        }
                    }
                    Err(e) => warn!(subsystem = "cache", error = %e, "Failed to encode cache envelope"),
                }
            }
            Err(e) => warn!(subsystem = "cache", error = %e, "Failed to serialize value for cache"),
        }

        Ok(value)
    }

    /// Untagged read with its own TTL. Serves a value up to `ttl` old even
    /// across invalidations.
    pub async fn fast_path<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(store) = self.inner.store.as_ref() else {
            return compute().await;
        };
        if ttl.is_zero() {
            return compute().await;
        }

        let storage_key = key.to_key();
        match store.get(&storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.inner.stats.hit();
                    return Ok(value);
                }
                Err(e) => warn!(subsystem = "cache", error = %e, "Failed to decode fast-path value"),
            },
            Ok(None) => {}
            Err(e) => {
                self.inner.stats.error();
                warn!(subsystem = "cache", op = "get", error = %e, "Cache read failed");
            }
        }

        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = store.set(&storage_key, raw, ttl).await {
                    self.inner.stats.error();
                    warn!(subsystem = "cache", op = "set", error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(subsystem = "cache", error = %e, "Failed to serialize value for cache"),
        }
        Ok(value)
    }

    /// Run `compute` without reading or writing the cache.
    pub async fn bypass<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.inner.stats.bypass();
        debug!(
            subsystem = "cache",
            op = "bypass",
            namespace = key.namespace(),
            "Cache bypassed"
        );
        compute().await
    }

    /// Invalidate every entry carrying any of `tags`.
    ///
    /// Returns false when the store could not be updated; the tags then stay
    /// pending and reads touching them skip the cache.
    pub async fn invalidate(&self, tags: &[CacheTag]) -> bool {
        let Some(store) = self.inner.store.as_ref() else {
            return true;
        };
        let start = Instant::now();

        let mut pending = self.inner.pending.lock().await;
        let mut to_bump: BTreeSet<CacheTag> = pending.clone();
        to_bump.extend(tags.iter().copied());
        if to_bump.is_empty() {
            return true;
        }
        let bump: Vec<CacheTag> = to_bump.into_iter().collect();
        let names = tag_names(&bump);

        match store.bump_generations(&names).await {
            Ok(()) => {
                pending.clear();
                debug!(
                    subsystem = "cache",
                    op = "invalidate",
                    tags = ?names,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Cache tags invalidated"
                );
                true
            }
            Err(e) => {
                self.inner.stats.error();
                pending.extend(bump.iter().copied());
                warn!(
                    subsystem = "cache",
                    op = "invalidate",
                    tags = ?names,
                    error = %e,
                    "Failed to invalidate cache tags, bypassing them until a bump succeeds"
                );
                false
            }
        }
    }

    async fn touches_pending(&self, tags: &[CacheTag]) -> bool {
        let pending = self.inner.pending.lock().await;
        !pending.is_empty() && tags.iter().any(|t| pending.contains(t))
    }

    /// Retry bumping pending tags. Returns true when none remain.
    async fn flush_pending(&self) -> bool {
        self.invalidate(&[]).await
    }
}
