//! # docshelf-db
//!
//! PostgreSQL persistence layer for docshelf.
//!
//! This crate provides:
//! - Connection pool management
//! - The document system of record (`PgDocumentRepository`)
//! - A durable processing task queue (`PgTaskQueue`)
//! - Blob storage for uploaded bytes (`FilesystemBlobStore`)
//! - In-process equivalents of all three for single-node setups and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use docshelf_db::{Database, DocumentRepository};
//!
//! let db = Database::connect("postgres://localhost/docshelf").await?;
//! let record = db.documents.get(id).await?;
//! ```

pub mod blobs;
pub mod documents;
pub mod memory;
pub mod pool;
pub mod tasks;

// Re-export core types
pub use docshelf_core::*;

pub use blobs::{compute_content_hash, generate_storage_path, FilesystemBlobStore, MemoryBlobStore};
pub use documents::PgDocumentRepository;
pub use memory::{MemoryDocumentRepository, MemoryTaskQueue};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tasks::{retry_delay_secs, PgTaskQueue, QueueConfig, LEASE_EXPIRED_ERROR};

/// PostgreSQL-backed repositories sharing one pool.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document system of record.
    pub documents: PgDocumentRepository,
    /// Durable processing task queue.
    pub tasks: PgTaskQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_queue_config(pool, QueueConfig::default())
    }

    pub fn with_queue_config(pool: sqlx::Pool<sqlx::Postgres>, queue: QueueConfig) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            tasks: PgTaskQueue::with_config(pool.clone(), queue),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
