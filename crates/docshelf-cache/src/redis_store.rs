//! Redis cache store.
//!
//! Values are plain `SET EX` strings; tag generations are `INCR` counters
//! under `ds:gen:<tag>` read back with `MGET`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use docshelf_core::{CacheStore, Error, Result};

use crate::keys::generation_key;

fn cache_error(e: redis::RedisError) -> Error {
    Error::Cache(e.to_string())
}

#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let connection = ConnectionManager::new(client).await.map_err(cache_error)?;
        info!(
            subsystem = "cache",
            component = "redis_store",
            op = "connect",
            "Redis cache store connected"
        );
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(cache_error)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(cache_error)
    }

    async fn generations(&self, tags: &[&str]) -> Result<Vec<u64>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = tags.iter().map(|t| generation_key(t)).collect();
        let mut conn = self.connection.clone();
        let values = redis::cmd("MGET")
            .arg(&keys)
            .query_async::<Vec<Option<u64>>>(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(0)).collect())
    }

    async fn bump_generations(&self, tags: &[&str]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for tag in tags {
            pipe.incr(generation_key(tag), 1u64).ignore();
        }
        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
