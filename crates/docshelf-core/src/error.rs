//! Error types for docshelf.

use thiserror::Error;

/// Result type alias using docshelf's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docshelf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document record not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upload format is not one of the supported formats
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Upload exceeds the configured size ceiling
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Content extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Search index operation failed
    #[error("Index error: {0}")]
    Index(String),

    /// Cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Task queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Blob storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authenticated but not the owner of the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure class of an [`Error`], used to decide whether a failure aborts the
/// enclosing operation or is recovered locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected synchronously; nothing was persisted.
    Validation,
    /// Recovered locally as empty text.
    Extraction,
    /// Recovered locally; the record stays eligible for reindexing.
    Index,
    /// Fatal for the enclosing mutation.
    Record,
    /// Recovered locally as a cache miss.
    Cache,
    /// Everything else.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::UnsupportedFormat(_)
            | Error::PayloadTooLarge { .. } => ErrorKind::Validation,
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::Index(_) => ErrorKind::Index,
            Error::Database(_)
            | Error::NotFound(_)
            | Error::DocumentNotFound(_)
            | Error::Storage(_)
            | Error::Queue(_) => ErrorKind::Record,
            Error::Cache(_) => ErrorKind::Cache,
            Error::Serialization(_)
            | Error::Config(_)
            | Error::Forbidden(_)
            | Error::Internal(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// True for errors that should be surfaced to the caller as a 4xx.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
