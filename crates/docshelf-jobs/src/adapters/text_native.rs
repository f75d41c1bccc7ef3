//! TextNative extraction adapter: plain text and markdown.

use async_trait::async_trait;
use serde_json::json;

use docshelf_core::{Error, ExtractionAdapter, ExtractionResult, ExtractionStrategy, FileFormat, Result};

/// Bytes inspected when deciding whether a "text" upload is really binary.
const SNIFF_BYTES: usize = 8192;

/// Adapter for plain text and markdown files.
///
/// Reads bytes as UTF-8 with lossy conversion. Input that looks binary (NUL
/// bytes, or mostly undecodable sequences) is rejected as corrupt.
pub struct TextNativeAdapter;

fn looks_binary(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(SNIFF_BYTES)];
    if sample.contains(&0) {
        return true;
    }
    let decoded = String::from_utf8_lossy(sample);
    let total = decoded.chars().count();
    let replaced = decoded.chars().filter(|c| *c == '\u{FFFD}').count();
    total > 0 && replaced * 10 > total
}

#[async_trait]
impl ExtractionAdapter for TextNativeAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::TextNative
    }

    async fn extract(&self, data: &[u8], format: FileFormat) -> Result<ExtractionResult> {
        if looks_binary(data) {
            return Err(Error::Extraction(format!(
                "{} upload contains binary content",
                format
            )));
        }

        let text = String::from_utf8_lossy(data).into_owned();
        let char_count = text.chars().count();
        let line_count = text.lines().count();

        Ok(ExtractionResult {
            extracted_text: Some(text),
            metadata: json!({
                "char_count": char_count,
                "line_count": line_count,
            }),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "text_native"
    }
}
