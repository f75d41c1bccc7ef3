//! # docshelf-core
//!
//! Core types, traits, and abstractions for the docshelf course-document
//! library.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other docshelf crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use text::{display_name, magic_matches, normalize_text, sanitize_filename, tokenize};
pub use traits::*;
