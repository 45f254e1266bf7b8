//! lexrag - legal knowledge retrieval and ingestion
//!
//! Document ingestion (PDF/DOCX/text extraction, chunking, embedding) and
//! role-aware knowledge composition over a local SQLite store, with Gemini
//! as the embedding and summarization provider.

pub mod cli;
pub mod embedding;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod knowledge;

// Re-exports
pub use embedding::{
    get_api_key, has_api_key, EmbeddedText, EmbeddingError, EmbeddingGateway, EmbeddingProvider,
    GeminiEmbedding,
};
pub use extractor::{extract, ExtractedText, ExtractionError, SourceKind};
pub use generation::{GeminiGenerator, TextGenerator};
pub use ingest::{ChunkSummary, IngestError, IngestPipeline, IngestRequest};
pub use knowledge::{
    get_data_dir, select_core, Brief, BriefRepository, BriefStore, ChunkPatch, ChunkStore,
    ChunkStrategy, ComposerConfig, KnowledgeChunk, KnowledgeComposer, NewChunk, Role, StoreError,
};
