//! # docshelf-search
//!
//! Search index projection for docshelf.
//!
//! This crate provides:
//! - `IndexProjector`, which turns records plus extracted text into index
//!   documents and tolerates index outages
//! - `PgSearchIndex`, a PostgreSQL weighted-tsvector index with trigram
//!   typo tolerance
//! - `MemorySearchIndex`, an in-process index with fuzzy term matching
//!
//! ## Example
//!
//! ```ignore
//! use docshelf_search::{IndexProjector, PgSearchIndex, SearchQuery};
//!
//! let projector = IndexProjector::new(Arc::new(PgSearchIndex::new(pool)));
//! projector.project(&record, &text).await?;
//! let results = projector.search(&SearchQuery::new("krebs cycle")).await?;
//! ```

pub mod fuzzy;
pub mod highlight;
pub mod memory_index;
pub mod pg_index;
pub mod projector;

// Re-export core types
pub use docshelf_core::*;

pub use memory_index::MemorySearchIndex;
pub use pg_index::PgSearchIndex;
pub use projector::{IndexProjector, ProjectorConfig};
