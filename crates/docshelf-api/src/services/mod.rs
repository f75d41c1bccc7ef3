//! Service layer for business logic.

pub mod orchestrator;
pub mod query;

pub use orchestrator::{
    validate_subject, DeleteReport, IngestionOrchestrator, RenameReport, SweepReport,
    UploadReceipt, UploadRequest, UploadStage,
};
pub use query::SearchQueryService;
