//! Content extraction: the adapter registry and the never-failing
//! [`ContentExtractor`] front end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use docshelf_core::defaults::{
    EXTRACTED_TEXT_MAX_CHARS, OFFICE_EXTRACTION_MAX_BYTES, PDF_EXTRACTION_MAX_BYTES,
    TEXT_EXTRACTION_MAX_BYTES,
};
use docshelf_core::{
    magic_matches, normalize_text, Error, ExtractionAdapter, ExtractionResult, ExtractionStrategy,
    FileFormat, Result,
};

use crate::adapters::{LegacyOfficeAdapter, OfficeConvertAdapter, PdfTextAdapter, TextNativeAdapter};

/// Registry mapping extraction strategies to their adapter implementations.
pub struct ExtractionRegistry {
    adapters: HashMap<ExtractionStrategy, Arc<dyn ExtractionAdapter>>,
}

impl ExtractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with an adapter for every supported format.
    pub fn with_defaults() -> Self {
        Self::for_limits(&ExtractionLimits::default())
    }

    /// Default adapters, with PDF batching capped at `limits.max_chars`.
    pub fn for_limits(limits: &ExtractionLimits) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextNativeAdapter));
        registry.register(Arc::new(PdfTextAdapter::new(limits.max_chars)));
        registry.register(Arc::new(OfficeConvertAdapter));
        registry.register(Arc::new(LegacyOfficeAdapter));
        registry
    }

    /// Register an adapter. Replaces any existing adapter for the same strategy.
    pub fn register(&mut self, adapter: Arc<dyn ExtractionAdapter>) {
        self.adapters.insert(adapter.strategy(), adapter);
    }

    /// Extract content using the adapter registered for `format`'s strategy.
    pub async fn extract(&self, data: &[u8], format: FileFormat) -> Result<ExtractionResult> {
        let strategy = format.strategy();
        let adapter = self.adapters.get(&strategy).ok_or_else(|| {
            Error::Extraction(format!(
                "No extraction adapter registered for strategy: {:?}",
                strategy
            ))
        })?;
        adapter.extract(data, format).await
    }

    /// List all strategies that have registered adapters.
    pub fn available_strategies(&self) -> Vec<ExtractionStrategy> {
        self.adapters.keys().copied().collect()
    }

    pub fn has_adapter(&self, strategy: ExtractionStrategy) -> bool {
        self.adapters.contains_key(&strategy)
    }

    /// Run health checks on all registered adapters.
    pub async fn health_check_all(&self) -> HashMap<ExtractionStrategy, bool> {
        let checks = self.adapters.iter().map(|(strategy, adapter)| async move {
            (*strategy, adapter.health_check().await.unwrap_or(false))
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }
}

impl Default for ExtractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Size ceilings and output cap applied by [`ContentExtractor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub text_max_bytes: usize,
    pub office_max_bytes: usize,
    pub pdf_max_bytes: usize,
    pub max_chars: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            text_max_bytes: TEXT_EXTRACTION_MAX_BYTES,
            office_max_bytes: OFFICE_EXTRACTION_MAX_BYTES,
            pdf_max_bytes: PDF_EXTRACTION_MAX_BYTES,
            max_chars: EXTRACTED_TEXT_MAX_CHARS,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ExtractionLimits {
    /// Read limits from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `EXTRACTION_TEXT_MAX_BYTES` | 10 MiB |
    /// | `EXTRACTION_OFFICE_MAX_BYTES` | 30 MiB |
    /// | `EXTRACTION_PDF_MAX_BYTES` | 20 MiB |
    /// | `EXTRACTED_TEXT_MAX_CHARS` | 100000 |
    pub fn from_env() -> Self {
        Self {
            text_max_bytes: env_usize("EXTRACTION_TEXT_MAX_BYTES", TEXT_EXTRACTION_MAX_BYTES),
            office_max_bytes: env_usize("EXTRACTION_OFFICE_MAX_BYTES", OFFICE_EXTRACTION_MAX_BYTES),
            pdf_max_bytes: env_usize("EXTRACTION_PDF_MAX_BYTES", PDF_EXTRACTION_MAX_BYTES),
            max_chars: env_usize("EXTRACTED_TEXT_MAX_CHARS", EXTRACTED_TEXT_MAX_CHARS),
        }
    }

    /// Byte ceiling for `format`.
    pub fn limit_for(&self, format: FileFormat) -> usize {
        match format.strategy() {
            ExtractionStrategy::TextNative => self.text_max_bytes,
            ExtractionStrategy::PdfText => self.pdf_max_bytes,
            ExtractionStrategy::OfficeConvert | ExtractionStrategy::LegacyOffice => {
                self.office_max_bytes
            }
        }
    }
}

/// Turns one file's bytes into normalized plain text.
///
/// `extract` never fails: oversized, corrupt or unreadable input, a missing
/// tool or an adapter error all produce an empty string and a warning.
pub struct ContentExtractor {
    registry: Arc<ExtractionRegistry>,
    limits: ExtractionLimits,
}

impl ContentExtractor {
    pub fn new(registry: ExtractionRegistry, limits: ExtractionLimits) -> Self {
        Self {
            registry: Arc::new(registry),
            limits,
        }
    }

    /// Extractor with every default adapter and limits from the environment.
    pub fn from_env() -> Self {
        Self::with_limits(ExtractionLimits::from_env())
    }

    /// Extractor with every default adapter configured for `limits`.
    pub fn with_limits(limits: ExtractionLimits) -> Self {
        Self::new(ExtractionRegistry::for_limits(&limits), limits)
    }

    pub fn limits(&self) -> &ExtractionLimits {
        &self.limits
    }

    pub fn registry(&self) -> &ExtractionRegistry {
        &self.registry
    }

    pub async fn extract(&self, data: &[u8], format: FileFormat) -> String {
        if data.is_empty() {
            return String::new();
        }

        let limit = self.limits.limit_for(format);
        if data.len() > limit {
            warn!(
                subsystem = "jobs",
                component = "extractor",
                format = %format,
                size_bytes = data.len(),
                limit,
                "Input exceeds extraction size ceiling, indexing without text"
            );
            return String::new();
        }

        if !magic_matches(format, data) {
            warn!(
                subsystem = "jobs",
                component = "extractor",
                format = %format,
                size_bytes = data.len(),
                "Content does not match the declared format, indexing without text"
            );
            return String::new();
        }

        let start = Instant::now();
        match self.registry.extract(data, format).await {
            Ok(result) => {
                let raw = result.extracted_text.unwrap_or_default();
                let text = normalize_text(&raw, self.limits.max_chars);
                debug!(
                    subsystem = "jobs",
                    component = "extractor",
                    format = %format,
                    char_count = text.chars().count(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Extraction complete"
                );
                text
            }
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "extractor",
                    format = %format,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Extraction failed, indexing without text"
                );
                String::new()
            }
        }
    }

    pub async fn health_check_all(&self) -> HashMap<ExtractionStrategy, bool> {
        self.registry.health_check_all().await
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::with_limits(ExtractionLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ExtractionRegistry::new();
        assert!(registry.available_strategies().is_empty());
        assert!(!registry.has_adapter(ExtractionStrategy::TextNative));
    }

    #[test]
    fn test_registry_defaults_cover_every_format() {
        let registry = ExtractionRegistry::with_defaults();
        for format in FileFormat::ALL {
            assert!(registry.has_adapter(format.strategy()), "{format}");
        }
    }

    #[tokio::test]
    async fn test_registry_extract_missing_adapter() {
        let registry = ExtractionRegistry::new();
        assert!(registry.extract(b"%PDF-1.4", FileFormat::Pdf).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_health_check_all() {
        let mut registry = ExtractionRegistry::new();
        registry.register(Arc::new(TextNativeAdapter));
        let results = registry.health_check_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[&ExtractionStrategy::TextNative]);
    }

    #[test]
    fn test_limits_per_format() {
        let limits = ExtractionLimits::default();
        assert_eq!(limits.limit_for(FileFormat::Txt), 10 * 1024 * 1024);
        assert_eq!(limits.limit_for(FileFormat::Md), 10 * 1024 * 1024);
        assert_eq!(limits.limit_for(FileFormat::Pdf), 20 * 1024 * 1024);
        assert_eq!(limits.limit_for(FileFormat::Docx), 30 * 1024 * 1024);
        assert_eq!(limits.limit_for(FileFormat::Ppt), 30 * 1024 * 1024);
        assert!(limits.pdf_max_bytes < limits.office_max_bytes);
    }

    #[tokio::test]
    async fn test_extract_normalizes_text() {
        let extractor = ContentExtractor::default();
        let text = extractor
            .extract(b"  Krebs\tcycle\n\n  notes  ", FileFormat::Txt)
            .await;
        assert_eq!(text, "Krebs cycle notes");
    }

    #[tokio::test]
    async fn test_extract_caps_characters() {
        let extractor = ContentExtractor::with_limits(ExtractionLimits {
            max_chars: 5,
            ..Default::default()
        });
        assert_eq!(extractor.extract(b"abcdefgh", FileFormat::Md).await, "abcde");
    }

    #[tokio::test]
    async fn test_oversized_input_is_empty() {
        let extractor = ContentExtractor::new(
            ExtractionRegistry::with_defaults(),
            ExtractionLimits {
                text_max_bytes: 4,
                ..Default::default()
            },
        );
        assert_eq!(extractor.extract(b"too long", FileFormat::Txt).await, "");
    }

    #[tokio::test]
    async fn test_magic_mismatch_is_empty() {
        let extractor = ContentExtractor::default();
        assert_eq!(extractor.extract(b"plain words", FileFormat::Pdf).await, "");
        assert_eq!(extractor.extract(b"plain words", FileFormat::Docx).await, "");
        assert_eq!(extractor.extract(b"plain words", FileFormat::Doc).await, "");
    }

    #[tokio::test]
    async fn test_missing_adapter_is_empty() {
        let extractor = ContentExtractor::new(ExtractionRegistry::new(), ExtractionLimits::default());
        assert_eq!(extractor.extract(b"hello", FileFormat::Txt).await, "");
    }

    #[tokio::test]
    async fn test_empty_input_is_empty() {
        assert_eq!(ContentExtractor::default().extract(b"", FileFormat::Pdf).await, "");
    }
}
