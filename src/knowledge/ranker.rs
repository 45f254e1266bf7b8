//! Similarity ranking
//!
//! Pure functions over whatever vectors the caller supplies: cosine
//! similarity plus top-k ranking. Two strictness levels exist on purpose:
//! the strict form errors on dimension mismatch (trusted provenance, a
//! mismatch is a real bug), while the lenient form scores a mismatched
//! candidate 0.0 so one corrupt stored row cannot abort ranking of the
//! whole candidate set.

use thiserror::Error;

/// A candidate vector's length differed from the query vector's length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("vector dimension mismatch: expected {expected}, got {got}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub got: usize,
}

/// One ranked candidate: position in the input slice plus its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub index: usize,
    pub score: f32,
}

// ============================================================================
// Cosine Similarity
// ============================================================================

/// Cosine similarity, strict: errors when lengths differ. Vectors are never
/// silently padded or truncated. Zero-norm inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(cosine_equal_len(a, b))
}

/// Cosine similarity, lenient: scores 0.0 on dimension mismatch instead of
/// erroring. For untrusted stored vectors (legacy rows, provider changes).
pub fn cosine_similarity_lenient(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    cosine_equal_len(a, b)
}

fn cosine_equal_len(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// Top-k Ranking
// ============================================================================

/// Rank candidates by descending cosine similarity to the query, strict.
///
/// Ties retain their relative input order (stable sort).
pub fn rank<C: AsRef<[f32]>>(
    query: &[f32],
    candidates: &[C],
    k: usize,
) -> Result<Vec<Ranked>, DimensionMismatch> {
    let mut scored = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(query, candidate.as_ref())?;
        scored.push(Ranked { index, score });
    }
    Ok(take_top(scored, k))
}

/// Rank candidates by descending cosine similarity, lenient: mismatched
/// candidates score 0.0 and stay in the running.
pub fn rank_lenient<C: AsRef<[f32]>>(query: &[f32], candidates: &[C], k: usize) -> Vec<Ranked> {
    let scored = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| Ranked {
            index,
            score: cosine_similarity_lenient(query, candidate.as_ref()),
        })
        .collect();
    take_top(scored, k)
}

fn take_top(mut scored: Vec<Ranked>, k: usize) -> Vec<Ranked> {
    // Stable sort keeps equal-score candidates in input order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

// ============================================================================
// Tests
// ============================================================================
