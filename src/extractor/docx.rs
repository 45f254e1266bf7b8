//! DOCX text extraction
//!
//! A .docx file is a ZIP container; the document body lives in
//! word/document.xml. Raw paragraph text is all we need - runs are
//! concatenated, paragraph ends become blank lines, layout is discarded.

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use regex::Regex;

/// Extract raw paragraph text from DOCX bytes.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let cursor = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).context("not a valid DOCX (zip) container")?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX container has no word/document.xml")?
        .read_to_string(&mut xml)
        .context("failed to read word/document.xml")?;

    Ok(document_xml_to_text(&xml))
}

/// Flatten WordprocessingML into plain text.
fn document_xml_to_text(xml: &str) -> String {
    // Paragraph and line-break markers become text breaks before tags go
    let with_breaks = xml
        .replace("</w:p>", "\n\n")
        .replace("<w:br/>", "\n")
        .replace("<w:tab/>", "\t");

    let tag_re = Regex::new(r"<[^>]+>").expect("invalid tag regex");
    let stripped = tag_re.replace_all(&with_breaks, "");

    let decoded = decode_entities(&stripped);

    // Collapse the blank-line runs left behind by empty paragraphs
    let mut out = String::with_capacity(decoded.len());
    let mut blank_run = 0usize;
    for line in decoded.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    out.trim().to_string()
}

/// Decode the five XML predefined entities.
fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_xml_to_text() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
        </w:body></w:document>"#;

        let text = document_xml_to_text(xml);
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        // Paragraphs separated by a blank line
        let first_idx = text.find("First").unwrap();
        let second_idx = text.find("Second").unwrap();
        assert!(text[first_idx..second_idx].contains("\n\n"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("Smith &amp; Co &lt;Bangkok&gt;"),
            "Smith & Co <Bangkok>"
        );
        assert_eq!(decode_entities("&quot;lease&quot; &apos;deed&apos;"), "\"lease\" 'deed'");
    }

    #[test]
    fn test_extract_docx_rejects_non_zip() {
        assert!(extract_docx(b"plain text, not a zip").is_err());
    }

    #[test]
    fn test_extract_docx_roundtrip() {
        // Build a minimal docx container in memory
        use std::io::Write;
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer
                .write_all(
                    br#"<w:document><w:body><w:p><w:r><w:t>Transfer duty is payable at the Land Office.</w:t></w:r></w:p></w:body></w:document>"#,
                )
                .unwrap();
            writer.finish().unwrap();
        }

        let text = extract_docx(&buf.into_inner()).unwrap();
        assert!(text.contains("Transfer duty is payable"));
    }
}
