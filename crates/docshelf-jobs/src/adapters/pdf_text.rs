//! PdfText extraction adapter: extracts the text layer with `pdftotext`
//! (poppler-utils).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::{debug, warn};

use docshelf_core::defaults::{
    EXTRACTED_TEXT_MAX_CHARS, EXTRACTION_CMD_TIMEOUT_SECS, LARGE_PDF_PAGE_THRESHOLD,
    PDF_BATCH_PAGES,
};
use docshelf_core::{
    Error, ExtractionAdapter, ExtractionResult, ExtractionStrategy, FileFormat, Result,
};

use super::command::{run_cmd_with_timeout, write_temp};

/// Adapter for extracting text from PDF files.
///
/// Long PDFs (lecture packs, scanned readers) are converted in page batches
/// and conversion stops once the extracted text reaches `max_chars`, so later
/// pages are never read. Every invocation is bounded by a per-command timeout.
#[derive(Debug, Clone)]
pub struct PdfTextAdapter {
    max_chars: usize,
}

impl PdfTextAdapter {
    /// Adapter that stops batching once `max_chars` characters are extracted.
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

impl Default for PdfTextAdapter {
    fn default() -> Self {
        Self::new(EXTRACTED_TEXT_MAX_CHARS)
    }
}

/// Parse `pdfinfo` output into a JSON metadata object.
fn parse_pdfinfo(output: &str) -> JsonValue {
    let mut metadata = serde_json::Map::new();

    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase().replace(' ', "_");
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if key == "pages" {
                if let Ok(pages) = value.parse::<u64>() {
                    metadata.insert(key, JsonValue::Number(pages.into()));
                    continue;
                }
            }
            metadata.insert(key, JsonValue::String(value.to_string()));
        }
    }

    JsonValue::Object(metadata)
}

/// Page count from pdfinfo metadata, 0 when unknown.
fn page_count(metadata: &JsonValue) -> usize {
    metadata.get("pages").and_then(|v| v.as_u64()).unwrap_or(0) as usize
}

/// Inclusive 1-based page ranges covering `pages` in `batch`-sized chunks.
fn page_batches(pages: usize, batch: usize) -> Vec<(usize, usize)> {
    let batch = batch.max(1);
    let mut ranges = Vec::new();
    let mut start = 1usize;
    while start <= pages {
        let end = (start + batch - 1).min(pages);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// Convert `pages` in batches with `convert(first, last)` until the text
/// reaches `max_chars`. Returns the text and the last page read.
async fn extract_batches<F, Fut>(
    pages: usize,
    max_chars: usize,
    mut convert: F,
) -> Result<(String, usize)>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut text = String::new();
    let mut chars = 0usize;
    let mut pages_read = pages;
    for (first, last) in page_batches(pages, PDF_BATCH_PAGES) {
        let chunk = convert(first, last).await?;
        chars += chunk.chars().count();
        text.push_str(&chunk);
        if chars >= max_chars {
            pages_read = last;
            break;
        }
    }
    Ok((text, pages_read))
}

#[async_trait]
impl ExtractionAdapter for PdfTextAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::PdfText
    }

    async fn extract(&self, data: &[u8], _format: FileFormat) -> Result<ExtractionResult> {
        if data.is_empty() {
            return Err(Error::Extraction("pdf upload is empty".into()));
        }
        if !data.starts_with(b"%PDF") {
            return Err(Error::Extraction("pdf upload has no %PDF header".into()));
        }

        let tmpfile = write_temp(data, "pdf")?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();
        let timeout = Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS);

        let mut metadata =
            match run_cmd_with_timeout(Command::new("pdfinfo").arg(&tmp_path), timeout).await {
                Ok(output) => parse_pdfinfo(&output),
                Err(e) => {
                    warn!(
                        subsystem = "jobs",
                        component = "pdf_text",
                        error = %e,
                        "pdfinfo failed, continuing without metadata"
                    );
                    serde_json::json!({})
                }
            };

        let pages = page_count(&metadata);
        let mut pages_read = pages;
        let text = if pages > LARGE_PDF_PAGE_THRESHOLD {
            let (text, last_page) = extract_batches(pages, self.max_chars, |first, last| {
                let mut cmd = Command::new("pdftotext");
                cmd.args(["-enc", "UTF-8", "-f"])
                    .arg(first.to_string())
                    .arg("-l")
                    .arg(last.to_string())
                    .arg(&tmp_path)
                    .arg("-");
                async move { run_cmd_with_timeout(&mut cmd, timeout).await }
            })
            .await?;
            pages_read = last_page;
            debug!(
                subsystem = "jobs",
                component = "pdf_text",
                pages,
                pages_read,
                max_chars = self.max_chars,
                "Batched extraction of long PDF"
            );
            text
        } else {
            run_cmd_with_timeout(
                Command::new("pdftotext")
                    .args(["-enc", "UTF-8"])
                    .arg(&tmp_path)
                    .arg("-"),
                timeout,
            )
            .await?
        };

        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("pages_read".to_string(), JsonValue::Number(pages_read.into()));
            obj.insert(
                "char_count".to_string(),
                JsonValue::Number(text.chars().count().into()),
            );
            obj.insert(
                "line_count".to_string(),
                JsonValue::Number(text.lines().count().into()),
            );
        }

        Ok(ExtractionResult {
            extracted_text: Some(text),
            metadata,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            // pdftotext -v exits with 0 or 99 depending on the version.
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_text_identity() {
        assert_eq!(PdfTextAdapter::default().strategy(), ExtractionStrategy::PdfText);
        assert_eq!(PdfTextAdapter::default().name(), "pdf_text");
    }

    #[tokio::test]
    async fn test_pdf_text_health_check() {
        assert!(PdfTextAdapter::default().health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_pdf_text_empty_input() {
        let err = PdfTextAdapter::default()
            .extract(b"", FileFormat::Pdf)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_pdf_text_invalid_pdf() {
        let err = PdfTextAdapter::default()
            .extract(b"not a pdf at all", FileFormat::Pdf)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("%PDF header"));
    }

    #[tokio::test]
    async fn test_pdf_text_extraction() {
        let pdf_bytes = b"%PDF-1.0
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj

2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj

3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]
   /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>
endobj

4 0 obj
<< /Length 44 >>
stream
BT /F1 12 Tf 100 700 Td (Osmosis 101) Tj ET
endstream
endobj

5 0 obj
<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>
endobj

xref
0 6
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000115 00000 n
0000000266 00000 n
0000000360 00000 n

trailer
<< /Size 6 /Root 1 0 R >>
startxref
434
%%EOF";

        if !PdfTextAdapter::default().health_check().await.unwrap_or(false) {
            eprintln!("pdftotext not installed, skipping");
            return;
        }

        let extraction = PdfTextAdapter::default()
            .extract(pdf_bytes, FileFormat::Pdf)
            .await
            .expect("extraction");
        assert!(extraction.extracted_text.unwrap().contains("Osmosis 101"));
        assert_eq!(extraction.metadata["pages_read"], 1);
    }

    #[test]
    fn test_pdfinfo_metadata_parsing() {
        let pdfinfo_output = "\
Title:          Lecture 4
Author:         Jane Roe
Pages:          142
Page size:      612 x 792 pts (letter)
";
        let metadata = parse_pdfinfo(pdfinfo_output);
        assert_eq!(metadata["title"], "Lecture 4");
        assert_eq!(metadata["author"], "Jane Roe");
        assert_eq!(metadata["pages"], 142);
        assert_eq!(metadata["page_size"], "612 x 792 pts (letter)");
        assert_eq!(page_count(&metadata), 142);
        assert_eq!(page_count(&serde_json::json!({"pages": "many"})), 0);
    }

    #[tokio::test]
    async fn test_batches_stop_at_configured_cap() {
        let mut calls = Vec::new();
        let (text, pages_read) = extract_batches(120, 30, |first, last| {
            calls.push((first, last));
            async move { Ok("x".repeat(20)) }
        })
        .await
        .unwrap();
        assert_eq!(calls, vec![(1, 50), (51, 100)]);
        assert_eq!(pages_read, 100);
        assert_eq!(text.len(), 40);
    }

    #[tokio::test]
    async fn test_batches_read_every_page_under_cap() {
        let (text, pages_read) = extract_batches(120, 1_000, |first, _| async move {
            Ok(format!("p{first} "))
        })
        .await
        .unwrap();
        assert_eq!(text, "p1 p51 p101 ");
        assert_eq!(pages_read, 120);
    }

    #[tokio::test]
    async fn test_batch_failure_propagates() {
        let result = extract_batches(120, 1_000, |_, _| async {
            Err(Error::Extraction("pdftotext crashed".into()))
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_adapter_carries_char_cap() {
        assert_eq!(PdfTextAdapter::default().max_chars(), EXTRACTED_TEXT_MAX_CHARS);
        assert_eq!(PdfTextAdapter::new(500).max_chars(), 500);
    }

    #[test]
    fn test_page_batches() {
        assert!(page_batches(0, 50).is_empty());
        assert_eq!(page_batches(120, 50), vec![(1, 50), (51, 100), (101, 120)]);
        assert_eq!(page_batches(100, 50), vec![(1, 50), (51, 100)]);
    }
}
