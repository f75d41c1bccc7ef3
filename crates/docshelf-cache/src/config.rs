//! Cache configuration.
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to use the in-process store (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `REDIS_CACHE_TTL`: TTL of tagged entries in seconds (default: 300)
//! - `CACHE_STATS_TTL_SECS`: TTL of library statistics (default: 60)
//! - `CACHE_FAST_PATH_TTL_SECS`: TTL of untagged fast-path keys (default: 5)
//! - `CACHE_BYPASS_USER`: user ID whose reads skip the cache entirely
//! - `CACHE_MEMORY_CAPACITY`: entries held by the in-process store (default: 10000)

use std::time::Duration;

use uuid::Uuid;

use docshelf_core::defaults;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_enabled: bool,
    pub redis_url: String,
    pub default_ttl: Duration,
    pub stats_ttl: Duration,
    pub fast_path_ttl: Duration,
    pub bypass_user: Option<Uuid>,
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_enabled: true,
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
            stats_ttl: Duration::from_secs(defaults::CACHE_STATS_TTL_SECS),
            fast_path_ttl: Duration::from_secs(defaults::CACHE_FAST_PATH_TTL_SECS),
            bypass_user: None,
            memory_capacity: defaults::CACHE_MEMORY_CAPACITY,
        }
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let redis_enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let bypass_user = std::env::var("CACHE_BYPASS_USER")
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok());

        let memory_capacity = std::env::var("CACHE_MEMORY_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::CACHE_MEMORY_CAPACITY);

        Self {
            redis_enabled,
            redis_url,
            default_ttl: env_secs("REDIS_CACHE_TTL", defaults::CACHE_TTL_SECS),
            stats_ttl: env_secs("CACHE_STATS_TTL_SECS", defaults::CACHE_STATS_TTL_SECS),
            fast_path_ttl: env_secs("CACHE_FAST_PATH_TTL_SECS", defaults::CACHE_FAST_PATH_TTL_SECS),
            bypass_user,
            memory_capacity,
        }
    }

    /// Redis URL with credentials masked, for logs.
    pub fn redacted_url(&self) -> String {
        match self.redis_url.rsplit_once('@') {
            Some((_, host)) => format!("redis://***@{host}"),
            None => self.redis_url.clone(),
        }
    }
}
