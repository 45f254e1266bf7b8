//! PDF text extraction
//!
//! Uses the pdf-extract crate on in-memory bytes. Page breaks in the
//! extracted stream are normalized to paragraph breaks so the chunker can
//! treat pages as natural boundaries.

use anyhow::{Context, Result};

/// Extract text from PDF bytes, page by page.
pub fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .context("failed to extract text from PDF bytes")?;

    if text.trim().is_empty() {
        anyhow::bail!("no text layer in PDF (possibly a scanned document)");
    }

    let pages = split_pages(&text);
    Ok(pages.join("\n\n"))
}

/// Split extracted PDF text into pages.
fn split_pages(text: &str) -> Vec<String> {
    // Form feed is the usual page separator in extracted streams
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // Some PDFs carry explicit separator lines instead, e.g. "--- Page 2 ---"
    let page_pattern = regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("invalid page separator regex");

    if page_pattern.is_match(text) {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================
