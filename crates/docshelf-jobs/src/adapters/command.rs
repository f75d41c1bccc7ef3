//! Helpers for adapters that shell out to conversion tools.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::Command;

use docshelf_core::{Error, Result};

/// Run a command with a timeout, returning stdout as a string.
///
/// The child is killed if the timeout fires or the future is dropped.
pub(crate) async fn run_cmd_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!(
                "External command timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Write `data` to a temp file with the given extension. The file is removed
/// when the handle drops.
pub(crate) fn write_temp(data: &[u8], extension: &str) -> Result<NamedTempFile> {
    let mut tmpfile = tempfile::Builder::new()
        .prefix("docshelf-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(|e| Error::Extraction(format!("Failed to create temp file: {}", e)))?;
    tmpfile
        .write_all(data)
        .map_err(|e| Error::Extraction(format!("Failed to write temp file: {}", e)))?;
    Ok(tmpfile)
}

/// True when `program` can be spawned at all.
pub(crate) async fn tool_available(program: &str, probe_arg: &str) -> bool {
    Command::new(program)
        .arg(probe_arg)
        .kill_on_drop(true)
        .output()
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_extraction_error() {
        let result = run_cmd_with_timeout(
            &mut Command::new("docshelf-no-such-tool"),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(Error::Extraction(_))));
        assert!(!tool_available("docshelf-no-such-tool", "--version").await);
    }

    #[test]
    fn test_write_temp_keeps_extension() {
        let file = write_temp(b"abc", "pdf").unwrap();
        assert!(file.path().to_string_lossy().ends_with(".pdf"));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"abc");
    }
}
