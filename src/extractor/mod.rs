//! Content extraction module
//!
//! Turns raw uploaded bytes (PDF, DOCX, plain text) into normalized UTF-8
//! text. Pure over bytes; no filesystem or network access.
//!
//! Failure policy: if structured parsing fails, a byte-level salvage pass
//! (strip control bytes, collapse whitespace) runs before giving up.
//! Extraction only errors when the recovered text is shorter than
//! [`MIN_USABLE_CHARS`] - anything below that is parser garbage, not content.

pub mod docx;
pub mod pdf;

use thiserror::Error;

/// Minimum character count for an extraction to count as usable.
pub const MIN_USABLE_CHARS: usize = 50;

/// Title length cap for derived document titles.
const MAX_TITLE_CHARS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Source format, decided from the declared MIME type and file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Docx,
    PlainText,
}

impl SourceKind {
    /// Classify from a declared MIME type, falling back to the file
    /// extension when the MIME type is generic or missing.
    pub fn detect(declared_mime: &str, file_name: &str) -> Self {
        let mime = declared_mime.trim().to_lowercase();
        match mime.as_str() {
            "application/pdf" => return SourceKind::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                return SourceKind::Docx;
            }
            m if m.starts_with("text/") => return SourceKind::PlainText,
            _ => {}
        }

        // Octet-stream or unknown: trust the extension claim
        let ext = file_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "pdf" => SourceKind::Pdf,
            "docx" => SourceKind::Docx,
            _ => SourceKind::PlainText,
        }
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Normalized UTF-8 text.
    pub text: String,
    /// Title derived from the document body (PDF only); `None` means the
    /// caller should fall back to the file name.
    pub title: Option<String>,
    pub kind: SourceKind,
}

/// Source bytes could not be turned into usable text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("recovered text too short to be usable ({got} chars, minimum {MIN_USABLE_CHARS})")]
    TooShort { got: usize },
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract normalized text from uploaded bytes.
pub fn extract(
    bytes: &[u8],
    declared_mime: &str,
    file_name: &str,
) -> Result<ExtractedText, ExtractionError> {
    let kind = SourceKind::detect(declared_mime, file_name);

    let structured = match kind {
        SourceKind::Pdf => pdf::extract_pdf(bytes),
        SourceKind::Docx => docx::extract_docx(bytes),
        SourceKind::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    };

    let raw = match structured {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                file = file_name,
                "Structured extraction failed ({}), falling back to byte salvage",
                e
            );
            salvage_bytes(bytes)
        }
    };

    let text = normalize_text(&raw);

    let usable = text.chars().count();
    if usable < MIN_USABLE_CHARS {
        // Structured path produced garbage; salvage may still recover more
        let salvaged = normalize_text(&salvage_bytes(bytes));
        let salvaged_chars = salvaged.chars().count();
        if salvaged_chars >= MIN_USABLE_CHARS {
            tracing::debug!(file = file_name, chars = salvaged_chars, "Byte salvage recovered text");
            return Ok(ExtractedText {
                title: None,
                text: salvaged,
                kind,
            });
        }
        return Err(ExtractionError::TooShort {
            got: usable.max(salvaged_chars),
        });
    }

    let title = match kind {
        SourceKind::Pdf => Some(derive_title(&text)),
        _ => None,
    };

    Ok(ExtractedText { text, title, kind })
}

// ============================================================================
// Title Derivation
// ============================================================================

/// Derive a document title from the first one or two non-empty lines.
///
/// Non-word characters are stripped, the result capped at 100 chars, with
/// "Untitled Document" as the fallback for empty results.
pub fn derive_title(text: &str) -> String {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut title = lines.next().unwrap_or("").to_string();
    // Very short first lines (cover-page numbers etc.) get the next line too
    if title.chars().count() < 20 {
        if let Some(second) = lines.next() {
            if !title.is_empty() {
                title.push(' ');
            }
            title.push_str(second);
        }
    }

    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        return "Untitled Document".to_string();
    }

    cleaned.chars().take(MAX_TITLE_CHARS).collect()
}

// ============================================================================
// Normalization & Salvage
// ============================================================================

/// Normalize line endings and collapse excessive blank lines.
fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            // At most one blank line between paragraphs
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }

    out.trim().to_string()
}

/// Byte-level heuristic recovery: lossy-decode, drop control bytes, collapse
/// whitespace runs. Last resort before declaring the upload unreadable.
fn salvage_bytes(bytes: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(bytes);

    let mut out = String::with_capacity(lossy.len());
    let mut last_was_space = false;
    for c in lossy.chars() {
        let keep = match c {
            '\n' => Some('\n'),
            c if c.is_control() => None,
            '\u{fffd}' => None, // replacement char from lossy decode
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        };
        if let Some(c) = keep {
            let is_space = c == ' ';
            if is_space && last_was_space {
                continue;
            }
            last_was_space = is_space;
            out.push(c);
        }
    }

    out.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TEXT: &str = "Thai land law distinguishes between freehold and leasehold interests.\n\nForeign parties typically hold long leases registered at the Land Office.";

    #[test]
    fn test_detect_from_mime() {
        assert_eq!(SourceKind::detect("application/pdf", "x.bin"), SourceKind::Pdf);
        assert_eq!(
            SourceKind::detect(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "x.bin"
            ),
            SourceKind::Docx
        );
        assert_eq!(SourceKind::detect("text/plain", "x.pdf"), SourceKind::PlainText);
    }

    #[test]
    fn test_detect_from_extension() {
        assert_eq!(
            SourceKind::detect("application/octet-stream", "brief.pdf"),
            SourceKind::Pdf
        );
        assert_eq!(
            SourceKind::detect("application/octet-stream", "contract.docx"),
            SourceKind::Docx
        );
        assert_eq!(SourceKind::detect("", "notes.md"), SourceKind::PlainText);
    }

    #[test]
    fn test_extract_plain_text() {
        let extracted = extract(LONG_TEXT.as_bytes(), "text/plain", "notes.txt").unwrap();
        assert_eq!(extracted.kind, SourceKind::PlainText);
        assert!(extracted.text.contains("freehold"));
        assert!(extracted.title.is_none());
    }

    #[test]
    fn test_extract_too_short_fails() {
        let err = extract(b"tiny", "text/plain", "t.txt").unwrap_err();
        match err {
            ExtractionError::TooShort { got } => assert!(got < MIN_USABLE_CHARS),
        }
    }

    #[test]
    fn test_extract_broken_pdf_salvages_embedded_text() {
        // Not a valid PDF; the salvage path should still recover the prose
        let mut bytes = b"%PDF-1.4\x00\x01\x02 ".to_vec();
        bytes.extend_from_slice(LONG_TEXT.as_bytes());
        let extracted = extract(&bytes, "application/pdf", "broken.pdf").unwrap();
        assert!(extracted.text.contains("freehold"));
    }

    #[test]
    fn test_derive_title_basic() {
        let text = "Foreign Ownership Restrictions\n\nBody text follows here.";
        assert_eq!(derive_title(text), "Foreign Ownership Restrictions");
    }

    #[test]
    fn test_derive_title_strips_non_word() {
        let text = "** Land Code (Amendment) Act!! **\n\nBody.";
        assert_eq!(derive_title(text), "Land Code Amendment Act");
    }

    #[test]
    fn test_derive_title_joins_short_first_line() {
        let text = "2024\nAnnual Compliance Review\n\nBody.";
        assert_eq!(derive_title(text), "2024 Annual Compliance Review");
    }

    #[test]
    fn test_derive_title_caps_length() {
        let text = "x".repeat(300);
        assert_eq!(derive_title(&text).chars().count(), 100);
    }

    #[test]
    fn test_derive_title_fallback() {
        assert_eq!(derive_title("***\n!!!\n"), "Untitled Document");
        assert_eq!(derive_title(""), "Untitled Document");
    }

    #[test]
    fn test_normalize_collapses_blank_runs() {
        let text = "para one\n\n\n\n\npara two\r\npara three";
        let normalized = normalize_text(text);
        assert_eq!(normalized, "para one\n\npara two\npara three");
    }

    #[test]
    fn test_salvage_strips_control_bytes() {
        let bytes = b"hello\x00\x01world\t  again";
        let salvaged = salvage_bytes(bytes);
        assert_eq!(salvaged, "helloworld again");
    }
}
