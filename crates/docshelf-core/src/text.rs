//! Text helpers shared by extraction, indexing and upload intake.

use crate::defaults;
use crate::models::FileFormat;

/// Normalize extracted text: strip control characters, collapse whitespace
/// runs to a single space, trim, and cap at `max_chars` characters.
pub fn normalize_text(raw: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_chars.saturating_mul(4)));
    let mut chars = 0usize;
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = chars > 0;
            continue;
        }
        if c.is_control() || c == '\u{FFFD}' {
            continue;
        }
        if pending_space {
            if chars + 1 >= max_chars {
                break;
            }
            out.push(' ');
            chars += 1;
            pending_space = false;
        }
        if chars >= max_chars {
            break;
        }
        out.push(c);
        chars += 1;
    }

    out
}

/// Lowercased alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Human-readable name derived from a filename: the stem with `_`, `-` and
/// `.` turned into spaces.
pub fn display_name(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && FileFormat::is_supported(ext) => stem,
        _ => filename,
    };
    stem.split(['_', '-', '.', ' '])
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitize an uploaded filename for storage.
///
/// Drops path components, replaces reserved and control characters with `_`,
/// and truncates to [`defaults::FILENAME_MAX_CHARS`] characters while keeping
/// the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    let max = defaults::FILENAME_MAX_CHARS;
    if sanitized.chars().count() <= max {
        return sanitized.to_string();
    }

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() < 16 => {
            let keep = max - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        _ => sanitized.chars().take(max).collect(),
    }
}

/// Check that `data` starts with the container signature expected for
/// `format`. Text formats carry no signature and always pass.
pub fn magic_matches(format: FileFormat, data: &[u8]) -> bool {
    const ZIP: &[u8] = b"PK\x03\x04";
    const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

    match format {
        FileFormat::Txt | FileFormat::Md => true,
        FileFormat::Pdf => match infer::get(data) {
            Some(kind) => kind.mime_type() == "application/pdf",
            None => data.starts_with(b"%PDF"),
        },
        FileFormat::Docx | FileFormat::Pptx => data.starts_with(ZIP),
        FileFormat::Doc | FileFormat::Ppt => data.starts_with(OLE2),
    }
}
