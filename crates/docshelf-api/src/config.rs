//! Server configuration read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use docshelf_core::defaults;
use docshelf_core::{Error, Result};

/// Backend selection for the system of record and the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Postgres => "postgres",
            Backend::Memory => "memory",
        })
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "memory" | "mem" => Ok(Backend::Memory),
            other => Err(Error::Config(format!("unknown backend: {other}"))),
        }
    }
}

/// Application configuration.
///
/// | Variable | Default |
/// |----------|---------|
/// | `DATABASE_URL` | `postgres://localhost/docshelf` |
/// | `STORAGE_BACKEND` | `postgres` |
/// | `SEARCH_BACKEND` | `postgres` |
/// | `FILE_STORAGE_PATH` | `/var/lib/docshelf/files` |
/// | `HOST` | `0.0.0.0` |
/// | `PORT` | `3000` |
/// | `MAX_UPLOAD_BYTES` | 50 MiB |
/// | `SWEEP_INTERVAL_SECS` | `300` |
/// | `SWEEP_STALE_AFTER_SECS` | `600` |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Where records and tasks live.
    pub storage_backend: Backend,
    pub search_backend: Backend,
    /// Root directory for uploaded bytes when records live in Postgres.
    pub file_storage_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    pub sweep_interval: Duration,
    /// Age after which a `pending` or `processing` record counts as stranded.
    pub sweep_stale_after: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/docshelf".to_string(),
            storage_backend: Backend::Postgres,
            search_backend: Backend::Postgres,
            file_storage_path: PathBuf::from("/var/lib/docshelf/files"),
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            sweep_interval: Duration::from_secs(defaults::SWEEP_INTERVAL_SECS),
            sweep_stale_after: Duration::from_secs(defaults::SWEEP_STALE_AFTER_SECS as u64),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    /// Read configuration from the environment. Unknown backend names are an
    /// error; unparsable numbers fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let storage_backend = match std::env::var("STORAGE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.storage_backend,
        };
        let search_backend = match std::env::var("SEARCH_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.search_backend,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            storage_backend,
            search_backend,
            file_storage_path: std::env::var("FILE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_storage_path),
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            sweep_interval: env_parse("SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sweep_stale_after: env_parse("SWEEP_STALE_AFTER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_stale_after),
        })
    }

    /// Whether any backend needs a Postgres pool.
    pub fn needs_database(&self) -> bool {
        self.storage_backend == Backend::Postgres || self.search_backend == Backend::Postgres
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("postgres".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!(" Memory ".parse::<Backend>().unwrap(), Backend::Memory);
        assert!(matches!(
            "sqlite".parse::<Backend>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.sweep_stale_after, Duration::from_secs(600));
        assert!(config.needs_database());
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_memory_backends_need_no_database() {
        let config = AppConfig {
            storage_backend: Backend::Memory,
            search_backend: Backend::Memory,
            ..Default::default()
        };
        assert!(!config.needs_database());
    }
}
