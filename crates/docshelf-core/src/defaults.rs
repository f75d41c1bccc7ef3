//! Centralized default constants for docshelf.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates read their `*Config::from_env()` fallbacks from here instead of
//! defining their own magic numbers.

// =============================================================================
// UPLOAD INTAKE
// =============================================================================

/// Largest upload accepted by intake (50 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Longest accepted subject name, in characters.
pub const SUBJECT_MAX_CHARS: usize = 200;

/// Longest stored filename, in characters.
pub const FILENAME_MAX_CHARS: usize = 255;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Size ceiling for plain text / markdown extraction (10 MiB).
pub const TEXT_EXTRACTION_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Size ceiling for Word / PowerPoint extraction (30 MiB).
pub const OFFICE_EXTRACTION_MAX_BYTES: usize = 30 * 1024 * 1024;

/// Size ceiling for PDF extraction (20 MiB). PDF is the most expensive
/// format to convert, so it gets the smallest ceiling of the binary formats.
pub const PDF_EXTRACTION_MAX_BYTES: usize = 20 * 1024 * 1024;

/// Maximum characters kept from one document's extracted text.
pub const EXTRACTED_TEXT_MAX_CHARS: usize = 100_000;

/// Timeout for a single external extraction command.
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Wall-clock budget for one whole `extract` call, enforced by the worker.
pub const EXTRACTION_TIMEOUT_SECS: u64 = 120;

/// Page threshold for batched PDF extraction.
pub const LARGE_PDF_PAGE_THRESHOLD: usize = 100;

/// Pages per batch for large PDF extraction.
pub const PDF_BATCH_PAGES: usize = 50;

// =============================================================================
// WORKER / QUEUE
// =============================================================================

/// Default polling interval when the queue is empty.
pub const WORKER_POLL_INTERVAL_MS: u64 = 500;

/// Default number of deliveries processed concurrently per worker.
pub const WORKER_MAX_CONCURRENT: usize = 4;

/// Delivery attempts before a task is dead-lettered.
pub const TASK_MAX_ATTEMPTS: i32 = 5;

/// Lease on a delivered task; an unacked task is redelivered after this.
pub const TASK_LEASE_SECS: i64 = 300;

/// Base delay before a nacked task becomes visible again.
pub const TASK_RETRY_BASE_SECS: i64 = 5;

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Interval between stranded-record sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// A `pending` record older than this is considered stranded.
pub const SWEEP_STALE_AFTER_SECS: i64 = 600;

/// Records re-enqueued per sweep.
pub const SWEEP_BATCH_LIMIT: i64 = 500;

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Attempts for one index upsert before the document is marked failed.
pub const INDEX_UPSERT_ATTEMPTS: u32 = 3;

/// Initial backoff between index upsert attempts (doubled per attempt).
pub const INDEX_RETRY_BACKOFF_MS: u64 = 200;

/// Re-reads of the record after an index write, re-projecting whenever its
/// indexed fields changed underneath the write.
pub const INDEX_PROJECTION_REREADS: u32 = 3;

/// Default page size for search.
pub const SEARCH_PAGE_LIMIT: i64 = 20;

/// Upper bound on a requested search page size.
pub const SEARCH_PAGE_LIMIT_MAX: i64 = 100;

/// Highlight fragments returned per hit.
pub const HIGHLIGHT_FRAGMENTS: usize = 3;

/// Characters of context on each side of a highlighted term.
pub const HIGHLIGHT_CONTEXT_CHARS: usize = 60;

/// Minimum `word_similarity` for typo-tolerant metadata matches (pg_trgm).
pub const FUZZY_SIMILARITY_THRESHOLD: f32 = 0.4;

// =============================================================================
// LISTING
// =============================================================================

/// Default page size for document listings.
pub const PAGE_LIMIT: i64 = 50;

/// Upper bound on a requested listing page size.
pub const PAGE_LIMIT_MAX: i64 = 200;

// =============================================================================
// CACHE
// =============================================================================

/// Default TTL for tagged cache entries.
pub const CACHE_TTL_SECS: u64 = 300;

/// TTL for cached library statistics.
pub const CACHE_STATS_TTL_SECS: u64 = 60;

/// TTL of the untagged fast-path keys. This is the documented staleness
/// bound for the hot subject listing.
pub const CACHE_FAST_PATH_TTL_SECS: u64 = 5;

/// Entry capacity of the in-process cache store.
pub const CACHE_MEMORY_CAPACITY: usize = 10_000;

/// Prefix for cache value keys.
pub const CACHE_KEY_PREFIX: &str = "ds:cache:";

/// Prefix for per-tag generation counters.
pub const CACHE_GENERATION_PREFIX: &str = "ds:gen:";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

// =============================================================================
// DATABASE
// =============================================================================

/// Connections reserved for request handling on top of one per worker slot.
pub const DB_REQUEST_CONNECTIONS: u32 = 6;

/// Seconds to wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle connection is kept.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds before a connection is recycled.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

/// Startup connection attempts before giving up.
pub const DB_CONNECT_ATTEMPTS: u32 = 5;

/// Delay between startup connection attempts.
pub const DB_CONNECT_RETRY_SECS: u64 = 2;
