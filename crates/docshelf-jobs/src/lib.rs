//! # docshelf-jobs
//!
//! Content extraction and the background worker for docshelf.
//!
//! This crate provides:
//! - [`ContentExtractor`]: bytes in, normalized text out, never an error
//! - Extraction adapters per format strategy, behind [`ExtractionRegistry`]
//! - [`DocumentProcessor`]: claim, extract, project and report one task
//! - [`JobWorker`]: concurrent queue consumer with graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! let processor = DocumentProcessor::new(documents, blobs, extractor, projector, reporter);
//! let worker = JobWorker::new(queue, processor, WorkerConfig::from_env());
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod processor;
pub mod worker;

pub use docshelf_core::*;

pub use adapters::{LegacyOfficeAdapter, OfficeConvertAdapter, PdfTextAdapter, TextNativeAdapter};
pub use extraction::{ContentExtractor, ExtractionLimits, ExtractionRegistry};
pub use processor::{DocumentProcessor, ProcessOutcome, StatusReporter};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
