//! CLI module
//!
//! lexrag command definitions and implementations. Commands talk to the
//! same stores and pipeline the library exposes; nothing here holds state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::embedding::{has_api_key, EmbeddingGateway};
use crate::generation::GeminiGenerator;
use crate::ingest::{IngestPipeline, IngestRequest};
use crate::knowledge::{
    get_data_dir, BriefStore, ChunkPatch, ChunkStore, ChunkStrategy, ComposerConfig,
    KnowledgeComposer, Role,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "lexrag")]
#[command(version, about = "Legal knowledge base: ingestion and retrieval", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a document file into the knowledge base
    Ingest {
        /// Path of the file to ingest (PDF, DOCX, or plain text)
        file: PathBuf,

        /// Declared MIME type; inferred from the extension when omitted
        #[arg(short, long)]
        mime: Option<String>,

        /// Category label for every produced chunk
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Chunking strategy: chunk, summarize, section, or hybrid
        #[arg(short, long, default_value = "chunk")]
        strategy: String,

        /// Owner identifier recorded on the chunks
        #[arg(long)]
        owner: Option<String>,
    },

    /// Add a hand-written knowledge entry
    Note {
        /// Entry title
        title: String,

        /// Entry content
        content: String,

        /// Category label
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Add a legal brief (published by default)
    Brief {
        /// Brief title
        title: String,

        /// Brief content
        content: String,

        /// Store as an unpublished draft
        #[arg(long)]
        draft: bool,
    },

    /// Compose the knowledge context for a query
    Ask {
        /// The question
        query: String,

        /// Caller role: buyer, lawyer, accountant, or existing_owner
        #[arg(short, long, default_value = "buyer")]
        role: String,

        /// Semantic matches kept after ranking
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,
    },

    /// List stored chunks
    List {
        /// Category filter
        #[arg(short, long)]
        category: Option<String>,

        /// Result limit
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Edit a stored chunk (PDF chunk content is immutable)
    Edit {
        /// Chunk id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New content
        #[arg(long)]
        content: Option<String>,

        /// New category
        #[arg(long)]
        category: Option<String>,

        /// Replacement tags, comma-separated
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Delete a chunk by id
    Delete {
        /// Chunk id
        id: String,
    },

    /// Show system status
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// Execute one CLI command.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            file,
            mime,
            category,
            tags,
            strategy,
            owner,
        } => cmd_ingest(file, mime, category, tags, &strategy, owner).await,
        Commands::Note {
            title,
            content,
            category,
            tags,
        } => cmd_note(&title, &content, &category, tags).await,
        Commands::Brief {
            title,
            content,
            draft,
        } => cmd_brief(&title, &content, draft),
        Commands::Ask { query, role, top_k } => cmd_ask(&query, &role, top_k).await,
        Commands::List { category, limit } => cmd_list(category.as_deref(), limit),
        Commands::Edit {
            id,
            title,
            content,
            category,
            tags,
        } => cmd_edit(&id, title, content, category, tags),
        Commands::Delete { id } => cmd_delete(&id),
        Commands::Status => cmd_status(),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn open_pipeline() -> Result<IngestPipeline> {
    let store = Arc::new(ChunkStore::open_default().context("Failed to open chunk store")?);
    let gateway = EmbeddingGateway::from_env();
    let summarizer = GeminiGenerator::from_env()
        .map(|g| Arc::new(g) as Arc<dyn crate::generation::TextGenerator>);
    Ok(IngestPipeline::new(store, gateway, summarizer))
}

/// Ingest a file: extract, decompose per strategy, embed, store.
async fn cmd_ingest(
    file: PathBuf,
    mime: Option<String>,
    category: String,
    tags: Vec<String>,
    strategy: &str,
    owner: Option<String>,
) -> Result<()> {
    let strategy: ChunkStrategy = match strategy.parse() {
        Ok(s) => s,
        Err(e) => bail!(e),
    };

    if strategy.needs_summarizer() && !has_api_key() {
        bail!(
            "Strategy '{}' needs a generation API key.\n\
             Set: export GEMINI_API_KEY=your-key",
            strategy.as_str()
        );
    }

    let bytes = std::fs::read(&file)
        .with_context(|| format!("Failed to read file {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    if !has_api_key() {
        println!("[!] No API key set; chunks will be stored without embeddings.");
    }

    println!("[*] Ingesting {} ({} bytes)...", file_name, bytes.len());

    let pipeline = open_pipeline()?;
    let summaries = pipeline
        .ingest(IngestRequest {
            bytes,
            declared_mime: mime.unwrap_or_default(),
            file_name,
            category,
            tags,
            strategy,
            owner_id: owner,
        })
        .await
        .context("Ingestion failed")?;

    println!("[OK] Stored {} chunk(s):\n", summaries.len());
    for summary in &summaries {
        let embed_str = if !summary.embedded {
            "no embedding"
        } else if summary.embedding_truncated {
            "embedded (truncated)"
        } else {
            "embedded"
        };
        println!("  {}  {}", summary.id, summary.title);
        println!("        {} chars | {}", summary.chars, embed_str);
    }

    Ok(())
}

/// Store a manual entry.
async fn cmd_note(title: &str, content: &str, category: &str, tags: Vec<String>) -> Result<()> {
    let pipeline = open_pipeline()?;
    let summary = pipeline
        .ingest_manual(title, content, category, tags, None)
        .await
        .context("Failed to store entry")?;

    println!("[OK] Entry stored (ID: {})", summary.id);
    if !summary.embedded {
        println!("     (no embedding; set GEMINI_API_KEY to enable semantic search)");
    }

    Ok(())
}

/// Store a legal brief.
fn cmd_brief(title: &str, content: &str, draft: bool) -> Result<()> {
    let store = BriefStore::open_default().context("Failed to open brief store")?;
    let id = store
        .add(title, content, !draft)
        .context("Failed to store brief")?;

    println!(
        "[OK] Brief stored (ID: {}, {})",
        id,
        if draft { "draft" } else { "published" }
    );

    Ok(())
}

/// Compose the knowledge context for a query and print it.
async fn cmd_ask(query: &str, role: &str, top_k: usize) -> Result<()> {
    let role: Role = match role.parse() {
        Ok(r) => r,
        Err(e) => bail!(e),
    };

    let chunks = Arc::new(ChunkStore::open_default().context("Failed to open chunk store")?);
    let briefs = Arc::new(BriefStore::open_default().context("Failed to open brief store")?);
    let gateway = EmbeddingGateway::from_env();

    if gateway.is_none() {
        println!("[!] No API key set; semantic search disabled, heuristics only.\n");
    }

    let composer = KnowledgeComposer::new(gateway, chunks, briefs, ComposerConfig { top_k });
    let context = composer.compose(query, role).await;

    if context.is_empty() {
        println!("[!] No relevant knowledge found.");
    } else {
        println!("{}", context);
    }

    Ok(())
}

/// List stored chunks, most recent first.
fn cmd_list(category: Option<&str>, limit: usize) -> Result<()> {
    let store = ChunkStore::open_default().context("Failed to open chunk store")?;
    let chunks = store.list_all(category).context("Failed to list chunks")?;

    if chunks.is_empty() {
        println!("[!] No stored chunks.");
        return Ok(());
    }

    println!("[OK] Stored chunks ({} shown):\n", chunks.len().min(limit));

    for chunk in chunks.iter().take(limit) {
        let embed_str = if chunk.embedding.is_some() { "vec" } else { "-" };
        println!(
            "  {}  [{}] [{}] {}",
            chunk.id,
            chunk.document_type.as_str(),
            embed_str,
            truncate_text(&chunk.title, 50)
        );
        println!(
            "        {} | {} | {} chars",
            chunk.created_at.format("%Y-%m-%d %H:%M"),
            chunk.category,
            chunk.content.chars().count()
        );
    }

    Ok(())
}

/// Apply a partial edit to a chunk.
fn cmd_edit(
    id: &str,
    title: Option<String>,
    content: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
) -> Result<()> {
    if title.is_none() && content.is_none() && category.is_none() && tags.is_none() {
        bail!("Nothing to change; pass at least one of --title, --content, --category, --tags");
    }

    let store = ChunkStore::open_default().context("Failed to open chunk store")?;
    let updated = store
        .update(
            id,
            ChunkPatch {
                title,
                content,
                category,
                tags,
            },
        )
        .context("Update failed")?;

    println!("[OK] Chunk {} updated", updated.id);
    println!("     Title: {}", updated.title);

    Ok(())
}

/// Delete a chunk.
fn cmd_delete(id: &str) -> Result<()> {
    let store = ChunkStore::open_default().context("Failed to open chunk store")?;
    let deleted = store.delete(id).context("Delete failed")?;

    if deleted {
        println!("[OK] Chunk {} deleted", id);
    } else {
        println!("[!] No chunk with id {}", id);
    }

    Ok(())
}

/// Show data location, key state, and store statistics.
fn cmd_status() -> Result<()> {
    println!("lexrag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] Data directory: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API key: set");
    } else {
        println!("[!] API key: not set (export GEMINI_API_KEY=your-key)");
    }

    match ChunkStore::open_default() {
        Ok(store) => {
            let stats = store.stats().context("Failed to read store statistics")?;
            println!();
            println!("[*] Chunks: {}", stats.chunk_count);
            println!("    With embeddings: {}", stats.embedded_count);
            println!(
                "    Content size: {}",
                format_bytes(stats.total_content_bytes)
            );
            println!("    Database: {}", stats.db_path.display());
        }
        Err(e) => {
            println!("[!] Store unavailable: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Trim display text to `max` chars with an ellipsis.
fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Human-readable byte size.
fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("0123456789abc", 10), "0123456789...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
