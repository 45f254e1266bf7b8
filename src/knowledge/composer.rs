//! Knowledge composition - query-time context assembly
//!
//! Merges two selection mechanisms into one context string: core knowledge
//! picked by keyword/role rules, and semantic matches ranked by cosine
//! similarity over brief documents (embedded on the fly) plus stored
//! uploaded chunks.
//!
//! Composition never fails the caller's chat turn. Semantic search is
//! best-effort: no gateway, a provider outage, or a store error all degrade
//! to a smaller (possibly empty) context.

use std::sync::Arc;

use crate::embedding::EmbeddingGateway;

use super::core::{select_core, Role};
use super::ranker::rank_lenient;
use super::store::{BriefRepository, ChunkStore, DocumentType};

// ============================================================================
// Types
// ============================================================================

/// Where a semantic match came from, as rendered in the context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    PdfDocument,
    LegalBrief,
    Document,
}

impl Provenance {
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::PdfDocument => "PDF Document",
            Provenance::LegalBrief => "Legal Brief",
            Provenance::Document => "Document",
        }
    }
}

/// One ranked semantic match, ready for assembly.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub title: String,
    pub content: String,
    pub provenance: Provenance,
    pub score: f32,
}

/// Composer tunables.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Semantic matches kept after ranking.
    pub top_k: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

// ============================================================================
// KnowledgeComposer
// ============================================================================

/// Assembles the knowledge context for one query and role.
pub struct KnowledgeComposer {
    gateway: Option<EmbeddingGateway>,
    chunks: Arc<ChunkStore>,
    briefs: Arc<dyn BriefRepository>,
    config: ComposerConfig,
}

impl KnowledgeComposer {
    /// `gateway: None` means semantic search is disabled up front and only
    /// the heuristic path runs; this is a construction-time decision, not a
    /// runtime credential check.
    pub fn new(
        gateway: Option<EmbeddingGateway>,
        chunks: Arc<ChunkStore>,
        briefs: Arc<dyn BriefRepository>,
        config: ComposerConfig,
    ) -> Self {
        Self {
            gateway,
            chunks,
            briefs,
            config,
        }
    }

    /// Assemble the context string for a query. Always returns a string,
    /// possibly empty; never an error.
    pub async fn compose(&self, query: &str, role: Role) -> String {
        let core = select_core(query, role);
        tracing::debug!(
            role = role.as_str(),
            core_matches = core.len(),
            "Core knowledge selected"
        );

        let semantic = match &self.gateway {
            None => Vec::new(),
            Some(gateway) => self.semantic_matches(gateway, query).await,
        };

        let mut parts: Vec<String> = Vec::with_capacity(core.len() + semantic.len());

        // Core knowledge first, raw content in selection order
        for entry in core {
            parts.push(entry.content.to_string());
        }

        // Then ranked semantic matches, each prefixed with provenance + title
        for m in semantic {
            parts.push(format!("[{}] {}\n{}", m.provenance.label(), m.title, m.content));
        }

        parts.join("\n\n")
    }

    /// Rank briefs and stored chunks against the query embedding.
    /// Failures degrade: a dead provider or store yields fewer candidates,
    /// never an error.
    async fn semantic_matches(&self, gateway: &EmbeddingGateway, query: &str) -> Vec<SemanticMatch> {
        let query_vector = match gateway.embed(query).await {
            Ok(embedded) => embedded.vector,
            Err(e) => {
                tracing::warn!("Query embedding failed, skipping semantic search: {}", e);
                return Vec::new();
            }
        };

        // title, content, provenance, vector
        let mut candidates: Vec<(String, String, Provenance, Vec<f32>)> = Vec::new();

        // Briefs are embedded on the fly; one failing brief is skipped, not fatal
        match self.briefs.list_published() {
            Ok(briefs) => {
                for brief in briefs {
                    match gateway.embed(&brief.content).await {
                        Ok(embedded) => candidates.push((
                            brief.title,
                            brief.content,
                            Provenance::LegalBrief,
                            embedded.vector,
                        )),
                        Err(e) => {
                            tracing::warn!(brief = %brief.id, "Skipping brief, embedding failed: {}", e);
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Brief repository unavailable: {}", e),
        }

        // Uploaded chunks come with stored vectors; unembedded rows cannot rank
        match self.chunks.list_all(None) {
            Ok(chunks) => {
                for chunk in chunks {
                    if let Some(vector) = chunk.embedding {
                        let provenance = match chunk.document_type {
                            DocumentType::UploadedPdf => Provenance::PdfDocument,
                            _ => Provenance::Document,
                        };
                        candidates.push((chunk.title, chunk.content, provenance, vector));
                    }
                }
            }
            Err(e) => tracing::warn!("Chunk store unavailable: {}", e),
        }

        if candidates.is_empty() {
            return Vec::new();
        }

        let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.3.as_slice()).collect();
        // Lenient on purpose: stored vectors may predate a provider change,
        // and one bad row must not abort the whole candidate set
        let ranked = rank_lenient(&query_vector, &vectors, self.config.top_k);

        tracing::debug!(
            candidates = candidates.len(),
            kept = ranked.len(),
            "Semantic ranking complete"
        );

        ranked
            .into_iter()
            .map(|r| {
                let (title, content, provenance, _) = candidates[r.index].clone();
                SemanticMatch {
                    title,
                    content,
                    provenance,
                    score: r.score,
                }
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
