//! Domain models for docshelf.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::text::display_name;

// =============================================================================
// PROCESSING STATUS
// =============================================================================

/// Asynchronous pipeline progress of a document record.
///
/// `pending -> processing -> completed | failed`. The only way back out of a
/// terminal state is an explicit re-processing request, which resets to
/// `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Whether the status is `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed | ProcessingStatus::Failed
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `completed|failed -> pending` is only legal as a re-processing reset.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown processing status: {other}"
            ))),
        }
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// Fixed set of document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Notes,
    Slides,
    Exam,
    Assignment,
    Textbook,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Notes,
        Category::Slides,
        Category::Exam,
        Category::Assignment,
        Category::Textbook,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notes => "notes",
            Category::Slides => "slides",
            Category::Exam => "exam",
            Category::Assignment => "assignment",
            Category::Textbook => "textbook",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Case-insensitive; unknown names are a validation error.
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| Error::InvalidInput(format!("unknown category: {}", s.trim())))
    }
}

// =============================================================================
// FILE FORMAT
// =============================================================================

/// Strategy used to turn a format's bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Plain text and markdown, decoded in-process.
    TextNative,
    /// PDF text layer via `pdftotext`.
    PdfText,
    /// OOXML (docx/pptx) via `pandoc`.
    OfficeConvert,
    /// OLE2 binary Word/PowerPoint via `antiword` / `catppt`.
    LegacyOffice,
}

/// Supported upload formats, identified by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
    Txt,
    Md,
}

impl FileFormat {
    pub const ALL: [FileFormat; 7] = [
        FileFormat::Pdf,
        FileFormat::Doc,
        FileFormat::Docx,
        FileFormat::Ppt,
        FileFormat::Pptx,
        FileFormat::Txt,
        FileFormat::Md,
    ];

    /// Look up a format by extension (case-insensitive, leading dot allowed).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        FileFormat::ALL
            .into_iter()
            .find(|f| f.extension() == ext || (ext == "markdown" && *f == FileFormat::Md))
    }

    /// Look up a format from a filename's final extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Pure predicate used by upload intake to reject unsupported formats
    /// before anything is persisted or scheduled.
    pub fn is_supported(ext: &str) -> bool {
        Self::from_extension(ext).is_some()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Doc => "doc",
            FileFormat::Docx => "docx",
            FileFormat::Ppt => "ppt",
            FileFormat::Pptx => "pptx",
            FileFormat::Txt => "txt",
            FileFormat::Md => "md",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Doc => "application/msword",
            FileFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileFormat::Ppt => "application/vnd.ms-powerpoint",
            FileFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileFormat::Txt => "text/plain",
            FileFormat::Md => "text/markdown",
        }
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            FileFormat::Txt | FileFormat::Md => ExtractionStrategy::TextNative,
            FileFormat::Pdf => ExtractionStrategy::PdfText,
            FileFormat::Docx | FileFormat::Pptx => ExtractionStrategy::OfficeConvert,
            FileFormat::Doc | FileFormat::Ppt => ExtractionStrategy::LegacyOffice,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FileFormat::from_extension(s).ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

/// Output of an extraction adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Raw extracted text (not yet normalized).
    pub extracted_text: Option<String>,
    /// Adapter-specific metadata (page count, char count, ...).
    pub metadata: JsonValue,
}

// =============================================================================
// DOCUMENT RECORD
// =============================================================================

/// The durable, authoritative entry describing an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub subject: String,
    pub category: Category,
    pub size_bytes: i64,
    pub format: FileFormat,
    /// BLAKE3 hex digest of the uploaded bytes.
    pub content_hash: String,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Owner-only status view.
    pub fn status_view(&self) -> StatusView {
        StatusView {
            id: self.id,
            status: self.status,
            error: self.error_message.clone(),
            updated_at: self.updated_at,
            processed_at: self.processed_at,
        }
    }

    /// Public listing view (no status, no storage locator).
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename.clone(),
            subject: self.subject.clone(),
            category: self.category,
            format: self.format,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Whether `other` projects to the same index metadata as `self`.
    pub fn same_projection(&self, other: &DocumentRecord) -> bool {
        self.owner_id == other.owner_id
            && self.filename == other.filename
            && self.subject == other.subject
            && self.category == other.category
            && self.format == other.format
            && self.size_bytes == other.size_bytes
    }
}

/// Fields needed to insert a new record. Status always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub subject: String,
    pub category: Category,
    pub size_bytes: i64,
    pub format: FileFormat,
    pub content_hash: String,
}

impl NewDocument {
    /// Materialize the record as it will be stored at insert time.
    pub fn into_record(self, now: DateTime<Utc>) -> DocumentRecord {
        DocumentRecord {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename,
            storage_path: self.storage_path,
            subject: self.subject,
            category: self.category,
            size_bytes: self.size_bytes,
            format: self.format,
            content_hash: self.content_hash,
            status: ProcessingStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}

/// Listing entry visible to any reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub subject: String,
    pub category: Category,
    pub format: FileFormat,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Processing status as shown to the owning user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub id: Uuid,
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Result of the atomic `pending -> processing` claim.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller now owns processing of the record.
    Claimed(DocumentRecord),
    /// The record no longer exists (deleted while queued).
    Missing,
    /// The record exists but was not `pending`.
    NotPending(ProcessingStatus),
}

/// Terminal result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Extraction and indexing finished; the text may be empty.
    Completed { char_count: usize },
    /// The index upsert could not be completed after retries.
    Failed { error: String },
}

impl ProcessingOutcome {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            ProcessingOutcome::Completed { .. } => ProcessingStatus::Completed,
            ProcessingOutcome::Failed { .. } => ProcessingStatus::Failed,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Completed { .. } => None,
            ProcessingOutcome::Failed { error } => Some(error),
        }
    }
}

/// Filters for system-of-record listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub subject: Option<String>,
    pub category: Option<Category>,
    pub format: Option<FileFormat>,
    pub owner_id: Option<Uuid>,
}

impl DocumentFilter {
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == record.subject)
            && self.category.map_or(true, |c| c == record.category)
            && self.format.map_or(true, |f| f == record.format)
            && self.owner_id.map_or(true, |o| o == record.owner_id)
    }
}

/// Limit/offset pagination, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Build from a 1-based page number and page size.
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let limit = per_page
            .unwrap_or(defaults::PAGE_LIMIT)
            .clamp(1, defaults::PAGE_LIMIT_MAX);
        let page = page.unwrap_or(1).max(1);
        Self {
            limit,
            offset: (page - 1) * limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a system-of-record listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub items: Vec<DocumentSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Derived, disposable projection of a record plus its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub display_name: String,
    pub subject: String,
    pub category: Category,
    pub format: FileFormat,
    pub size_bytes: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexDocument {
    pub fn from_record(record: &DocumentRecord, content: impl Into<String>) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            filename: record.filename.clone(),
            display_name: display_name(&record.filename),
            subject: record.subject.clone(),
            category: record.category,
            format: record.format,
            size_bytes: record.size_bytes,
            content: content.into(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Index fields that support aggregation and bulk rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexField {
    Subject,
    Category,
    Format,
}

impl IndexField {
    /// Column / field name in the index.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexField::Subject => "subject",
            IndexField::Category => "category",
            IndexField::Format => "format",
        }
    }

    /// Read this field's value from an index document.
    pub fn value_of<'a>(&self, doc: &'a IndexDocument) -> &'a str {
        match self {
            IndexField::Subject => &doc.subject,
            IndexField::Category => doc.category.as_str(),
            IndexField::Format => doc.format.extension(),
        }
    }
}

/// Free-text query plus conjunctive exact-match filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub subject: Option<String>,
    pub category: Option<Category>,
    pub format: Option<FileFormat>,
    pub limit: i64,
    pub offset: i64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            subject: None,
            category: None,
            format: None,
            limit: defaults::SEARCH_PAGE_LIMIT,
            offset: 0,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Trim the text, drop blank filters and clamp pagination.
    pub fn normalized(mut self) -> Self {
        self.text = self.text.trim().to_string();
        self.subject = self
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.limit = self.limit.clamp(1, defaults::SEARCH_PAGE_LIMIT_MAX);
        self.offset = self.offset.max(0);
        self
    }

    /// Whether a document satisfies every exact-match filter.
    pub fn filters_match(&self, doc: &IndexDocument) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == doc.subject)
            && self.category.map_or(true, |c| c == doc.category)
            && self.format.map_or(true, |f| f == doc.format)
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub filename: String,
    pub display_name: String,
    pub subject: String,
    pub category: Category,
    pub format: FileFormat,
    pub size_bytes: i64,
    pub updated_at: DateTime<Utc>,
    /// Content fragments with matches wrapped in `<em>`.
    pub highlights: Vec<String>,
}

/// A page of ranked results plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A `(value, count)` aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

/// Library-wide totals, computed from the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_documents: u64,
    pub subject_count: u64,
    pub by_category: Vec<FacetCount>,
    pub by_format: Vec<FacetCount>,
}

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Why a processing task was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskReason {
    Upload,
    Reprocess,
    Sweep,
}

/// Typed queue payload: process one document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub document_id: Uuid,
    pub reason: TaskReason,
}

impl ProcessingTask {
    pub fn new(document_id: Uuid, reason: TaskReason) -> Self {
        Self {
            document_id,
            reason,
        }
    }
}

/// One leased delivery of a task. Must be acked or nacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub task: ProcessingTask,
    /// 1-based delivery attempt.
    pub attempt: i32,
}
