//! Ingestion pipeline - uploaded bytes to stored embedded chunks
//!
//! extract -> chunk (per strategy) -> embed -> store, sequentially per
//! document. Chunks are independent rows, so sequential processing is a
//! simplicity/rate-limit choice, not a correctness requirement.
//!
//! Unlike composition, ingestion fails hard: a caller is waiting to confirm
//! the document was stored, so provider outages surface with their cause.
//! Size overflow never fails - the gateway truncates and the flag is stored.

use std::sync::Arc;

use thiserror::Error;

use crate::embedding::{EmbeddingError, EmbeddingGateway};
use crate::extractor::{self, ExtractionError, SourceKind};
use crate::generation::{summary_prompt, TextGenerator};
use crate::knowledge::chunker::{
    chunk_paragraphs, chunk_sections, ChunkStrategy, DEFAULT_MAX_CHUNK_CHARS,
};
use crate::knowledge::store::{ChunkStore, DocumentType, NewChunk, StoreError};

// ============================================================================
// Types
// ============================================================================

/// One document upload.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub bytes: Vec<u8>,
    pub declared_mime: String,
    pub file_name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub strategy: ChunkStrategy,
    pub owner_id: Option<String>,
}

/// What the caller gets back per stored chunk.
#[derive(Debug, Clone)]
pub struct ChunkSummary {
    pub id: String,
    pub title: String,
    pub chars: usize,
    pub embedded: bool,
    pub embedding_truncated: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("embedding failed during ingestion: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("strategy '{0}' requires a configured summarizer")]
    SummarizerUnavailable(&'static str),
    #[error("summarization failed: {0}")]
    Summarization(String),
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// Turns uploads and manual entries into stored, embedded chunks.
pub struct IngestPipeline {
    store: Arc<ChunkStore>,
    gateway: Option<EmbeddingGateway>,
    summarizer: Option<Arc<dyn TextGenerator>>,
    max_chunk_chars: usize,
}

impl IngestPipeline {
    /// `gateway: None` stores chunks without embeddings (tolerated absence);
    /// `summarizer: None` rejects the strategies that need one.
    pub fn new(
        store: Arc<ChunkStore>,
        gateway: Option<EmbeddingGateway>,
        summarizer: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            store,
            gateway,
            summarizer,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    /// Ingest one uploaded file. Returns a summary per stored chunk.
    pub async fn ingest(&self, req: IngestRequest) -> Result<Vec<ChunkSummary>, IngestError> {
        let extracted = extractor::extract(&req.bytes, &req.declared_mime, &req.file_name)?;

        let base_title = extracted
            .title
            .clone()
            .unwrap_or_else(|| title_from_file_name(&req.file_name));

        let document_type = match extracted.kind {
            SourceKind::Pdf => DocumentType::UploadedPdf,
            SourceKind::Docx | SourceKind::PlainText => DocumentType::UploadedText,
        };

        let segments = self.segments_for(&extracted.text, &base_title, req.strategy).await?;
        tracing::info!(
            file = %req.file_name,
            strategy = req.strategy.as_str(),
            segments = segments.len(),
            "Document decomposed"
        );

        if self.gateway.is_none() {
            tracing::warn!(
                file = %req.file_name,
                "No embedding gateway configured; storing chunks without embeddings"
            );
        }

        // Part numbering covers only the plain segments; labeled segments
        // (summaries) carry their label instead
        let plain_count = segments.iter().filter(|s| s.label.is_none()).count();
        let mut part = 0usize;
        let mut summaries = Vec::with_capacity(segments.len());

        for segment in segments {
            let title = match (&segment.label, plain_count > 1) {
                (Some(label), _) => format!("{} — {}", base_title, label),
                (None, true) => {
                    part += 1;
                    format!("{} — Part {}", base_title, part)
                }
                (None, false) => base_title.clone(),
            };

            // Embedding failure here is a hard error; the flag records
            // gateway truncation, never a failure
            let (embedding, truncated) = match &self.gateway {
                Some(gateway) => {
                    let embedded = gateway.embed(&segment.text).await?;
                    (Some(embedded.vector), embedded.truncated)
                }
                None => (None, false),
            };

            let chars = segment.text.chars().count();
            let stored = self.store.insert(NewChunk {
                title,
                content: segment.text,
                category: req.category.clone(),
                tags: req.tags.clone(),
                document_type,
                embedding,
                embedding_truncated: truncated,
                source_file: Some(req.file_name.clone()),
                source_size: Some(req.bytes.len() as u64),
                owner_id: req.owner_id.clone(),
            })?;

            summaries.push(ChunkSummary {
                embedded: stored.embedding.is_some(),
                embedding_truncated: stored.embedding_truncated,
                id: stored.id,
                title: stored.title,
                chars,
            });
        }

        Ok(summaries)
    }

    /// Store one hand-authored entry. Manual chunks are never overwritten
    /// by later ingestion and stay freely editable.
    pub async fn ingest_manual(
        &self,
        title: &str,
        text: &str,
        category: &str,
        tags: Vec<String>,
        owner_id: Option<String>,
    ) -> Result<ChunkSummary, IngestError> {
        let (embedding, truncated) = match &self.gateway {
            Some(gateway) => {
                let embedded = gateway.embed(text).await?;
                (Some(embedded.vector), embedded.truncated)
            }
            None => (None, false),
        };

        let stored = self.store.insert(NewChunk {
            title: title.to_string(),
            content: text.to_string(),
            category: category.to_string(),
            tags,
            document_type: DocumentType::Manual,
            embedding,
            embedding_truncated: truncated,
            source_file: None,
            source_size: None,
            owner_id,
        })?;

        Ok(ChunkSummary {
            embedded: stored.embedding.is_some(),
            embedding_truncated: stored.embedding_truncated,
            id: stored.id,
            title: stored.title,
            chars: stored.content.chars().count(),
        })
    }

    /// Form segments per strategy. Only segment formation differs;
    /// everything downstream is identical.
    async fn segments_for(
        &self,
        text: &str,
        base_title: &str,
        strategy: ChunkStrategy,
    ) -> Result<Vec<Segment>, IngestError> {
        let plain = |texts: Vec<String>| {
            texts
                .into_iter()
                .map(|text| Segment { text, label: None })
                .collect::<Vec<_>>()
        };

        Ok(match strategy {
            ChunkStrategy::Chunk => plain(chunk_paragraphs(text, self.max_chunk_chars)),
            ChunkStrategy::Section => plain(chunk_sections(text, self.max_chunk_chars)),
            ChunkStrategy::Summarize => {
                vec![Segment {
                    text: self.summarize(base_title, text).await?,
                    label: Some("Summary".to_string()),
                }]
            }
            ChunkStrategy::Hybrid => {
                let mut segments = vec![Segment {
                    text: self.summarize(base_title, text).await?,
                    label: Some("Summary".to_string()),
                }];
                segments.extend(plain(chunk_paragraphs(text, self.max_chunk_chars)));
                segments
            }
        })
    }

    async fn summarize(&self, title: &str, text: &str) -> Result<String, IngestError> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or(IngestError::SummarizerUnavailable("summarize/hybrid"))?;

        let prompt = summary_prompt(title, text);
        summarizer
            .generate(&prompt)
            .await
            .map_err(|e| IngestError::Summarization(e.to_string()))
    }
}

/// A formed segment, optionally carrying a label for its title suffix.
struct Segment {
    text: String,
    label: Option<String>,
}

/// Fallback title from the uploaded file name: strip the extension,
/// replace separators.
fn title_from_file_name(file_name: &str) -> String {
    let stem = file_name
        .rsplit('/')
        .next()
        .unwrap_or(file_name)
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let cleaned = stem.replace(['_', '-'], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Untitled Document".to_string()
    } else {
        cleaned.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbedLimits, EmbeddingProvider};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FakeProvider;

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.chars().count() as f32, 1.0, 0.5])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FakeSummarizer;

    #[async_trait]
    impl TextGenerator for FakeSummarizer {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok("Condensed summary of the document.".to_string())
        }

        fn name(&self) -> &str {
            "fake-summarizer"
        }
    }

    fn test_store(dir: &TempDir) -> Arc<ChunkStore> {
        Arc::new(ChunkStore::open(&dir.path().join("test.db")).unwrap())
    }

    fn gateway() -> EmbeddingGateway {
        EmbeddingGateway::with_defaults(Arc::new(FakeProvider))
    }

    fn gateway_with_limits(limits: EmbedLimits) -> EmbeddingGateway {
        EmbeddingGateway::new(Arc::new(FakeProvider), limits)
    }

    fn text_request(content: &str, strategy: ChunkStrategy) -> IngestRequest {
        IngestRequest {
            bytes: content.as_bytes().to_vec(),
            declared_mime: "text/plain".to_string(),
            file_name: "lease-guide.txt".to_string(),
            category: "leasehold".to_string(),
            tags: vec!["lease".to_string()],
            strategy,
            owner_id: Some("user-1".to_string()),
        }
    }

    fn long_text(paras: usize, chars_each: usize) -> String {
        (0..paras)
            .map(|i| format!("Paragraph {} {}", i, "x".repeat(chars_each)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[tokio::test]
    async fn test_ingest_text_file() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(store.clone(), Some(gateway()), None);

        let text = long_text(3, 100);
        let summaries = pipeline
            .ingest(text_request(&text, ChunkStrategy::Chunk))
            .await
            .unwrap();

        assert!(!summaries.is_empty());
        assert!(summaries.iter().all(|s| s.embedded));

        let stored = store.list_all(None).unwrap();
        assert_eq!(stored.len(), summaries.len());
        assert!(stored
            .iter()
            .all(|c| c.document_type == DocumentType::UploadedText));
        assert!(stored.iter().all(|c| c.source_file.as_deref() == Some("lease-guide.txt")));
    }

    #[tokio::test]
    async fn test_ingest_part_titles_when_split() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(store.clone(), Some(gateway()), None)
            .with_max_chunk_chars(150);

        let text = long_text(4, 120);
        let summaries = pipeline
            .ingest(text_request(&text, ChunkStrategy::Chunk))
            .await
            .unwrap();

        assert!(summaries.len() > 1);
        assert!(summaries[0].title.contains("— Part 1"));
        assert!(summaries[1].title.contains("— Part 2"));
        assert!(summaries.iter().all(|s| s.title.starts_with("lease guide")));
    }

    #[tokio::test]
    async fn test_ingest_single_chunk_no_part_suffix() {
        let dir = TempDir::new().unwrap();
        let pipeline = IngestPipeline::new(test_store(&dir), Some(gateway()), None);

        let text = long_text(1, 100);
        let summaries = pipeline
            .ingest(text_request(&text, ChunkStrategy::Chunk))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert!(!summaries[0].title.contains("Part"));
    }

    #[tokio::test]
    async fn test_ingest_oversized_content_kept_whole_embedding_truncated() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        // One 20,000-char paragraph, gateway ceiling far below it
        let pipeline = IngestPipeline::new(
            store.clone(),
            Some(gateway_with_limits(EmbedLimits {
                max_chars: 4000,
                max_tokens: 100_000,
                chars_per_token: 2,
            })),
            None,
        );

        let big = "y".repeat(20_000);
        let summaries = pipeline
            .ingest(text_request(&big, ChunkStrategy::Chunk))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].embedding_truncated);

        // Stored content is the full text; only the embedded span was capped
        let stored = store.get(&summaries[0].id).unwrap().unwrap();
        assert_eq!(stored.content.chars().count(), 20_000);
        assert!(stored.embedding_truncated);
        // FakeProvider encodes the embedded char count in the vector
        assert_eq!(stored.embedding.unwrap()[0], 4000.0);
    }

    #[tokio::test]
    async fn test_ingest_without_gateway_stores_unembedded() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(store.clone(), None, None);

        let summaries = pipeline
            .ingest(text_request(&long_text(2, 100), ChunkStrategy::Chunk))
            .await
            .unwrap();

        assert!(summaries.iter().all(|s| !s.embedded));
        assert!(store
            .list_all(None)
            .unwrap()
            .iter()
            .all(|c| c.embedding.is_none()));
    }

    #[tokio::test]
    async fn test_ingest_pdf_salvage_marks_uploaded_pdf() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(store.clone(), Some(gateway()), None);

        // Broken PDF bytes; the salvage path recovers the prose but the
        // chunk still carries PDF provenance and its immutability
        let mut bytes = b"%PDF-1.4\x00".to_vec();
        bytes.extend_from_slice(long_text(2, 100).as_bytes());

        let summaries = pipeline
            .ingest(IngestRequest {
                bytes,
                declared_mime: "application/pdf".to_string(),
                file_name: "scan.pdf".to_string(),
                category: "general".to_string(),
                tags: vec![],
                strategy: ChunkStrategy::Chunk,
                owner_id: None,
            })
            .await
            .unwrap();

        let stored = store.get(&summaries[0].id).unwrap().unwrap();
        assert_eq!(stored.document_type, DocumentType::UploadedPdf);
    }

    #[tokio::test]
    async fn test_ingest_unreadable_upload_fails() {
        let dir = TempDir::new().unwrap();
        let pipeline = IngestPipeline::new(test_store(&dir), Some(gateway()), None);

        let err = pipeline
            .ingest(text_request("x", ChunkStrategy::Chunk))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_ingest_summarize_without_summarizer_fails() {
        let dir = TempDir::new().unwrap();
        let pipeline = IngestPipeline::new(test_store(&dir), Some(gateway()), None);

        let err = pipeline
            .ingest(text_request(&long_text(2, 100), ChunkStrategy::Summarize))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SummarizerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ingest_hybrid_summary_plus_chunks() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(
            store.clone(),
            Some(gateway()),
            Some(Arc::new(FakeSummarizer)),
        )
        .with_max_chunk_chars(150);

        let summaries = pipeline
            .ingest(text_request(&long_text(3, 120), ChunkStrategy::Hybrid))
            .await
            .unwrap();

        // One summary segment plus the full decomposition
        assert_eq!(summaries.len(), 4);
        assert!(summaries[0].title.contains("— Summary"));

        let stored = store.get(&summaries[0].id).unwrap().unwrap();
        assert_eq!(stored.content, "Condensed summary of the document.");
    }

    #[tokio::test]
    async fn test_ingest_manual_entry() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let pipeline = IngestPipeline::new(store.clone(), Some(gateway()), None);

        let summary = pipeline
            .ingest_manual(
                "Usufruct Notes",
                "A usufruct grants use and enjoyment for life.",
                "structuring",
                vec!["usufruct".to_string()],
                Some("admin".to_string()),
            )
            .await
            .unwrap();

        let stored = store.get(&summary.id).unwrap().unwrap();
        assert_eq!(stored.document_type, DocumentType::Manual);
        assert!(stored.source_file.is_none());
        assert_eq!(stored.owner_id.as_deref(), Some("admin"));
    }

    #[test]
    fn test_title_from_file_name() {
        assert_eq!(title_from_file_name("lease-guide.txt"), "lease guide");
        assert_eq!(title_from_file_name("transfer_duty.pdf"), "transfer duty");
        assert_eq!(title_from_file_name("notes"), "notes");
        assert_eq!(title_from_file_name(".hidden"), "Untitled Document");
    }
}
