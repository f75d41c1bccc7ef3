//! Connection pool for the system of record and the task queue.
//!
//! The pool is sized from the worker concurrency: each in-flight document
//! holds a connection for its claim and report, and request handlers share
//! the remainder.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use docshelf_core::defaults;
use docshelf_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Attempts made by [`create_pool_with_config`] before failing.
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_workers(defaults::WORKER_MAX_CONCURRENT)
    }
}

impl PoolConfig {
    /// Pool sized for `workers` concurrent document tasks.
    pub fn for_workers(workers: usize) -> Self {
        let workers = u32::try_from(workers).unwrap_or(u32::MAX);
        Self {
            max_connections: workers.saturating_add(defaults::DB_REQUEST_CONNECTIONS),
            min_connections: 1,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Duration::from_secs(defaults::DB_MAX_LIFETIME_SECS),
            connect_attempts: defaults::DB_CONNECT_ATTEMPTS,
            connect_retry_delay: Duration::from_secs(defaults::DB_CONNECT_RETRY_SECS),
        }
    }

    /// Environment variables:
    ///   DB_MAX_CONNECTIONS      - explicit pool size (default: WORKER_MAX_CONCURRENT + 6)
    ///   WORKER_MAX_CONCURRENT   - worker slots the default size is derived from
    ///   DB_ACQUIRE_TIMEOUT_SECS - wait for a pooled connection (default: 30)
    ///   DB_CONNECT_ATTEMPTS     - startup attempts (default: 5)
    pub fn from_env() -> Self {
        let workers = env_parse("WORKER_MAX_CONCURRENT").unwrap_or(defaults::WORKER_MAX_CONCURRENT);
        let mut config = Self::for_workers(workers);
        if let Some(n) = env_parse::<u32>("DB_MAX_CONNECTIONS") {
            config.max_connections = n.max(1);
        }
        if let Some(secs) = env_parse("DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("DB_CONNECT_ATTEMPTS") {
            config.connect_attempts = n.max(1);
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect, retrying while the database is still coming up.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Creating database connection pool"
    );

    let options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime);

    let attempts = config.connect_attempts.max(1);
    let mut attempt = 1;
    let pool = loop {
        match options.clone().connect(database_url).await {
            Ok(pool) => break pool,
            Err(e) if attempt < attempts => {
                warn!(
                    subsystem = "db",
                    component = "pool",
                    attempt,
                    attempts,
                    error = %e,
                    "Database not reachable, retrying"
                );
                tokio::time::sleep(config.connect_retry_delay).await;
                attempt += 1;
            }
            Err(e) => return Err(Error::Database(e)),
        }
    };

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        attempt,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log pool occupancy. Warns when every connection is checked out, which
/// stalls claims and reports.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();
    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );
    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool exhausted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sized_from_workers() {
        let config = PoolConfig::for_workers(8);
        assert_eq!(config.max_connections, 8 + defaults::DB_REQUEST_CONNECTIONS);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_attempts, defaults::DB_CONNECT_ATTEMPTS);
    }

    #[test]
    fn test_default_matches_worker_default() {
        let config = PoolConfig::default();
        assert_eq!(
            config.max_connections,
            defaults::WORKER_MAX_CONCURRENT as u32 + defaults::DB_REQUEST_CONNECTIONS
        );
        assert_eq!(
            config.idle_timeout,
            Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_worker_count_saturates() {
        let config = PoolConfig::for_workers(usize::MAX);
        assert_eq!(config.max_connections, u32::MAX);
    }
}
