//! # docshelf-api
//!
//! HTTP surface and ingestion pipeline wiring for docshelf.
//!
//! - [`IngestionOrchestrator`]: upload, delete, rename and reprocess, each
//!   ordered record, then index, then cache
//! - [`SearchQueryService`]: cached search, listings, subjects and stats
//! - [`handlers::router`]: the axum routes
//! - [`AppConfig`]: server configuration from the environment

pub mod config;
pub mod error;
pub mod handlers;
pub mod services;
pub mod state;

pub use config::{AppConfig, Backend};
pub use error::ApiError;
pub use handlers::{router, Requester, USER_ID_HEADER};
pub use services::{
    DeleteReport, IngestionOrchestrator, RenameReport, SearchQueryService, SweepReport,
    UploadReceipt, UploadRequest, UploadStage,
};
pub use state::AppState;
