//! LegacyOffice adapter: OLE2 Word (`antiword`) and PowerPoint (`catppt`).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use docshelf_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use docshelf_core::{
    Error, ExtractionAdapter, ExtractionResult, ExtractionStrategy, FileFormat, Result,
};

use super::command::{run_cmd_with_timeout, tool_available, write_temp};

pub struct LegacyOfficeAdapter;

/// Converter program and its leading arguments for a legacy format.
fn converter_for(format: FileFormat) -> Option<(&'static str, &'static [&'static str])> {
    match format {
        // -w 0: no hard line wrapping
        FileFormat::Doc => Some(("antiword", &["-w", "0"])),
        FileFormat::Ppt => Some(("catppt", &[])),
        _ => None,
    }
}

#[async_trait]
impl ExtractionAdapter for LegacyOfficeAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::LegacyOffice
    }

    async fn extract(&self, data: &[u8], format: FileFormat) -> Result<ExtractionResult> {
        if data.is_empty() {
            return Err(Error::Extraction("Cannot convert empty document".to_string()));
        }
        let (program, args) = converter_for(format).ok_or_else(|| {
            Error::Extraction(format!("no legacy converter for {} uploads", format))
        })?;

        let tmpfile = write_temp(data, format.extension())?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        let text = run_cmd_with_timeout(
            Command::new(program).args(args).arg(&tmp_path),
            Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        )
        .await?;

        let char_count = text.chars().count();
        Ok(ExtractionResult {
            extracted_text: Some(text),
            metadata: json!({
                "converter": program,
                "char_count": char_count,
            }),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tool_available("antiword", "-h").await && tool_available("catppt", "-h").await)
    }

    fn name(&self) -> &str {
        "legacy_office"
    }
}
