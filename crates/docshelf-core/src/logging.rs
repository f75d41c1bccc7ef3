//! Structured logging schema and field name constants for docshelf.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, cache hits/misses |
//! | TRACE | Per-item iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "ingest", "search", "db", "cache", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "projector", "worker", "extractor", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "upload", "claim", "upsert", "invalidate"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document record UUID being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Queue delivery UUID.
pub const DELIVERY_ID: &str = "delivery_id";

/// Upload lifecycle stage reached.
pub const STAGE: &str = "stage";

/// Document format extension.
pub const FORMAT: &str = "format";

/// Cache tags touched by an operation.
pub const TAGS: &str = "tags";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or listing.
pub const RESULT_COUNT: &str = "result_count";

/// Characters of extracted text.
pub const CHAR_COUNT: &str = "char_count";

/// Input size in bytes.
pub const SIZE_BYTES: &str = "size_bytes";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
