//! Text chunking
//!
//! Splits normalized document text into bounded-size segments along
//! paragraph boundaries. A single paragraph longer than the budget is NOT
//! split further - it becomes one oversized segment and the embedding
//! gateway's truncation is the backstop. Semantic coherence wins over strict
//! size guarantees at this level.

use std::str::FromStr;

use regex::Regex;

/// Default per-segment character budget.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1200;

// ============================================================================
// Chunking Strategy
// ============================================================================

/// How a document is decomposed into chunks at ingestion time.
///
/// Strategy choice only changes how segments are formed; embedding and
/// storage are identical downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Uniform paragraph-boundary chunking.
    Chunk,
    /// One condensed representative chunk for the whole document.
    Summarize,
    /// Chunk boundaries follow detected headings.
    Section,
    /// Summary chunk plus the full `Chunk` decomposition.
    Hybrid,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Chunk => "chunk",
            ChunkStrategy::Summarize => "summarize",
            ChunkStrategy::Section => "section",
            ChunkStrategy::Hybrid => "hybrid",
        }
    }

    /// Whether this strategy needs the external summarizer.
    pub fn needs_summarizer(&self) -> bool {
        matches!(self, ChunkStrategy::Summarize | ChunkStrategy::Hybrid)
    }
}

impl FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chunk" => Ok(ChunkStrategy::Chunk),
            "summarize" => Ok(ChunkStrategy::Summarize),
            "section" => Ok(ChunkStrategy::Section),
            "hybrid" => Ok(ChunkStrategy::Hybrid),
            other => Err(format!(
                "unknown chunking strategy '{}' (expected chunk, summarize, section, or hybrid)",
                other
            )),
        }
    }
}

// ============================================================================
// Paragraph Chunking
// ============================================================================

/// Split text into segments of at most `max_chars` characters along
/// paragraph boundaries.
///
/// Paragraphs are greedily accumulated into the current segment until the
/// next one would exceed the budget. Segments come out in source order;
/// joining them with blank lines reproduces the paragraph sequence of the
/// input (modulo separator normalization).
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in paragraphs(text) {
        let para_chars = para.chars().count();

        // +2 for the blank-line separator
        if !current.is_empty() && current_chars + 2 + para_chars > max_chars {
            segments.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(para);
        current_chars += para_chars;
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Paragraphs of a text: blank-line separated, trimmed, non-empty.
fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

// ============================================================================
// Section Chunking
// ============================================================================

/// Split text into sections at detected headings, then paragraph-chunk each
/// section to the budget.
///
/// Headings recognized: markdown (`#` through `######`) and numbered
/// headings (`1.`, `2.3`, `4)` followed by text).
pub fn chunk_sections(text: &str, max_chars: usize) -> Vec<String> {
    split_sections(text)
        .iter()
        .flat_map(|section| chunk_paragraphs(section, max_chars))
        .collect()
}

/// Split text into heading-delimited sections.
fn split_sections(text: &str) -> Vec<String> {
    let heading_re = heading_regex();
    let mut sections = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if heading_re.is_match(line) && !current.trim().is_empty() {
            sections.push(current.trim().to_string());
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }

    sections
}

fn heading_regex() -> Regex {
    Regex::new(r"^(#{1,6}\s+\S|\d+(\.\d+)*[.)]?\s+\S)").expect("invalid heading regex")
}

// ============================================================================
// Tests
// ============================================================================
