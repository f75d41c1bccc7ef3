//! OfficeConvert adapter: converts docx/pptx to plain text with pandoc.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::debug;

use docshelf_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use docshelf_core::{
    Error, ExtractionAdapter, ExtractionResult, ExtractionStrategy, FileFormat, Result,
};

use super::command::{run_cmd_with_timeout, write_temp};

pub struct OfficeConvertAdapter;

/// pandoc reader for an OOXML format.
fn pandoc_input_format(format: FileFormat) -> Option<&'static str> {
    match format {
        FileFormat::Docx => Some("docx"),
        FileFormat::Pptx => Some("pptx"),
        _ => None,
    }
}

#[async_trait]
impl ExtractionAdapter for OfficeConvertAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::OfficeConvert
    }

    async fn extract(&self, data: &[u8], format: FileFormat) -> Result<ExtractionResult> {
        if data.is_empty() {
            return Err(Error::Extraction("Cannot convert empty document".to_string()));
        }
        let reader = pandoc_input_format(format).ok_or_else(|| {
            Error::Extraction(format!("pandoc cannot read {} uploads", format))
        })?;

        let tmpfile = write_temp(data, format.extension())?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        debug!(
            subsystem = "jobs",
            component = "office_convert",
            format = reader,
            "Converting with pandoc"
        );

        let text = run_cmd_with_timeout(
            Command::new("pandoc")
                .arg("-f")
                .arg(reader)
                .arg("-t")
                .arg("plain")
                .arg("--wrap=none")
                .arg(&tmp_path),
            Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        )
        .await?;

        let char_count = text.chars().count();
        let line_count = text.lines().count();

        Ok(ExtractionResult {
            extracted_text: Some(text),
            metadata: json!({
                "format": reader,
                "char_count": char_count,
                "line_count": line_count,
                "converter": "pandoc",
            }),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pandoc").arg("--version").output().await {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "office_convert"
    }
}
