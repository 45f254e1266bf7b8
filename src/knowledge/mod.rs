//! Knowledge module - storage, ranking, and context composition
//!
//! - Store: SQLite-backed chunk and brief persistence
//! - Ranker: cosine similarity over embedding vectors
//! - Core: hand-authored passages with keyword/role selection
//! - Chunker: paragraph and section text splitting
//! - Composer: assembles the final knowledge context per query

pub mod chunker;
pub mod composer;
pub mod core;
pub mod ranker;
pub mod store;

// Re-exports
pub use chunker::{chunk_paragraphs, chunk_sections, ChunkStrategy, DEFAULT_MAX_CHUNK_CHARS};
pub use composer::{ComposerConfig, KnowledgeComposer, Provenance, SemanticMatch};
pub use self::core::{select_core, CoreKnowledgeEntry, Role, CORE_ENTRIES, KEYWORD_RULES};
pub use ranker::{
    cosine_similarity, cosine_similarity_lenient, rank, rank_lenient, DimensionMismatch, Ranked,
};
pub use store::{
    get_data_dir, Brief, BriefRepository, BriefStore, ChunkPatch, ChunkStore, DocumentType,
    KnowledgeChunk, NewChunk, StoreError, StoreStats,
};
