use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Export targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Raw UTF-8 text
    Text,
    /// Minimal WordprocessingML envelope: one paragraph, one run
    Docx,
}

impl ExportFormat {
    /// File extension for this format
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Docx => "docx",
        }
    }
}

/// Errors from transcript export
#[derive(Debug, Error)]
pub enum ExportError {
    /// The transcript is empty or whitespace-only; checked before any
    /// payload is built
    #[error("nothing to save")]
    EmptyTranscript,

    /// Filesystem failure
    #[error("could not write {path}: {source}")]
    Write {
        /// Destination that failed
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Write the transcript to `output_dir` and return the file path
///
/// # Errors
/// Returns [`ExportError::EmptyTranscript`] for empty or whitespace-only
/// input, or [`ExportError::Write`] on filesystem failure. A failed write
/// never leaves a partial destination file.
pub fn export(
    text: &str,
    format: ExportFormat,
    locale_display: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    export_at(text, format, locale_display, output_dir, Utc::now())
}

fn export_at(
    text: &str,
    format: ExportFormat,
    locale_display: &str,
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, ExportError> {
    if text.trim().is_empty() {
        return Err(ExportError::EmptyTranscript);
    }

    let payload = match format {
        ExportFormat::Text => text.to_owned(),
        ExportFormat::Docx => docx_envelope(text),
    };

    let path = output_dir.join(file_name(format, locale_display, now));
    write_atomic(&path, payload.as_bytes())?;

    info!(path = %path.display(), bytes = payload.len(), "transcript exported");
    Ok(path)
}

/// Timestamped export filename; `:` and `.` in the timestamp are replaced
/// so the name stays portable
fn file_name(format: ExportFormat, locale_display: &str, now: DateTime<Utc>) -> String {
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!(
        "transcript-{locale_display}-{timestamp}.{}",
        format.extension()
    )
}

/// Escape the three XML metacharacters, `&` first
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn docx_envelope(text: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>"
        ),
        escape_xml(text)
    )
}

/// Write through a sibling temp file and rename into place
fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), ExportError> {
    let write_err = |source: std::io::Error| ExportError::Write {
        path: path.display().to_string(),
        source,
    };

    let temp_path = path.with_extension("part");
    fs::write(&temp_path, payload).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        write_err(source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_empty_transcript_rejected_before_io() {
        let result = export_at(
            "",
            ExportFormat::Text,
            "English (US)",
            Path::new("/nonexistent/nowhere"),
            fixed_time(),
        );
        assert!(matches!(result, Err(ExportError::EmptyTranscript)));
    }

    #[test]
    fn test_whitespace_only_transcript_rejected() {
        let result = export_at(
            "  \n\t ",
            ExportFormat::Docx,
            "Svenska",
            Path::new("/nonexistent/nowhere"),
            fixed_time(),
        );
        assert!(matches!(result, Err(ExportError::EmptyTranscript)));
    }

    #[test]
    fn test_text_export_writes_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_at(
            "Hej världen. ",
            ExportFormat::Text,
            "Svenska",
            dir.path(),
            fixed_time(),
        )
        .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "Hej världen. ");
        assert_eq!(path.extension().unwrap(), "txt");
    }

    #[test]
    fn test_docx_export_escapes_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_at(
            "a < b & b > c",
            ExportFormat::Docx,
            "English (US)",
            dir.path(),
            fixed_time(),
        )
        .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("a &lt; b &amp; b &gt; c"));
        assert!(!contents.contains("a < b"));
        assert!(contents.contains("<w:t>"));
    }

    #[test]
    fn test_filename_carries_locale_and_cleaned_timestamp() {
        let name = file_name(ExportFormat::Text, "Svenska", fixed_time());
        assert!(name.starts_with("transcript-Svenska-2026-02-14T09-30-05"));
        assert!(name.ends_with(".txt"));
        let stem = name.trim_end_matches(".txt");
        assert!(!stem.contains(':'));
        assert!(!stem.contains('.'));
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let missing_dir = Path::new("/nonexistent/taltext-export-test");
        let result = export_at(
            "some text",
            ExportFormat::Text,
            "English (US)",
            missing_dir,
            fixed_time(),
        );
        assert!(matches!(result, Err(ExportError::Write { .. })));
        assert!(!missing_dir.exists());
    }

    #[test]
    fn test_escape_order_does_not_double_escape() {
        assert_eq!(escape_xml("&lt;"), "&amp;lt;");
        assert_eq!(escape_xml("<>&"), "&lt;&gt;&amp;");
    }
}
