//! Document store - rusqlite-backed chunk and brief repositories
//!
//! Stores embedded knowledge chunks and hand-curated legal briefs.
//! Default location: ~/.lexrag/knowledge.db
//!
//! Stored `content` is never truncated; only the text fed to the embedding
//! gateway is capped, so content and embedding may describe different spans
//! for very large segments. The `embedding_truncated` flag records when that
//! happened.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Data Directory
// ============================================================================

/// Data directory path (~/.lexrag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lexrag")
}

// ============================================================================
// Types
// ============================================================================

/// Origin of a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Split out of an uploaded PDF. Immutable after creation.
    UploadedPdf,
    /// Split out of an uploaded text/DOCX file. Freely editable.
    UploadedText,
    /// Hand-authored entry. Freely editable, never overwritten by ingestion.
    Manual,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::UploadedPdf => "uploaded_pdf",
            DocumentType::UploadedText => "uploaded_text",
            DocumentType::Manual => "manual",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "uploaded_pdf" => DocumentType::UploadedPdf,
            "uploaded_text" => DocumentType::UploadedText,
            _ => DocumentType::Manual,
        }
    }
}

/// A unit of retrievable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    /// Human label; part-indexed ("Doc — Part 2") when a source document
    /// was split into more than one chunk.
    pub title: String,
    /// Full normalized text. Never truncated at rest.
    pub content: String,
    /// Free-form classification tag, e.g. "foreign-ownership".
    pub category: String,
    pub tags: Vec<String>,
    pub document_type: DocumentType,
    /// Absent only if embedding generation failed and was tolerated.
    pub embedding: Option<Vec<f32>>,
    /// True when the embedding was computed from a truncated prefix.
    pub embedding_truncated: bool,
    /// Provenance for uploaded-origin chunks; absent for manual entries.
    pub source_file: Option<String>,
    pub source_size: Option<u64>,
    /// Which caller created the chunk. Provenance only; authorization is
    /// the surrounding application's concern.
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert form for a chunk; id and timestamp are system-generated.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub document_type: DocumentType,
    pub embedding: Option<Vec<f32>>,
    pub embedding_truncated: bool,
    pub source_file: Option<String>,
    pub source_size: Option<u64>,
    pub owner_id: Option<String>,
}

/// Partial update for a chunk. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChunkPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ChunkPatch {
    /// Fields that PDF immutability protects.
    fn touches_protected(&self) -> bool {
        self.title.is_some() || self.content.is_some() || self.tags.is_some()
    }
}

/// Store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk not found: {0}")]
    NotFound(String),
    #[error("PDF-origin chunks are immutable; delete and re-upload to change content, title, or tags")]
    PdfImmutable,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored field was not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Lock,
}

// ============================================================================
// ChunkStore
// ============================================================================

/// Repository of embedded knowledge chunks.
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ChunkStore {
    /// Open the store, creating the file and schema as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open at the default location (~/.lexrag/knowledge.db).
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&default_db_path()?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL,
                document_type TEXT NOT NULL,
                embedding TEXT,
                embedding_truncated INTEGER NOT NULL DEFAULT 0,
                source_file TEXT,
                source_size INTEGER,
                owner_id TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks(category)",
            [],
        )?;

        tracing::debug!("Chunk store initialized at {:?}", self.db_path);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    /// Insert a chunk with a system-generated id. Returns the stored row.
    pub fn insert(&self, new: NewChunk) -> Result<KnowledgeChunk, StoreError> {
        let chunk = KnowledgeChunk {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            content: new.content,
            category: new.category,
            tags: new.tags,
            document_type: new.document_type,
            embedding: new.embedding,
            embedding_truncated: new.embedding_truncated,
            source_file: new.source_file,
            source_size: new.source_size,
            owner_id: new.owner_id,
            created_at: Utc::now(),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chunks (id, title, content, category, tags, document_type,
                                 embedding, embedding_truncated, source_file, source_size,
                                 owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                chunk.id,
                chunk.title,
                chunk.content,
                chunk.category,
                serde_json::to_string(&chunk.tags)?,
                chunk.document_type.as_str(),
                chunk
                    .embedding
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                chunk.embedding_truncated as i64,
                chunk.source_file,
                chunk.source_size.map(|s| s as i64),
                chunk.owner_id,
                chunk.created_at.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            id = %chunk.id,
            title = %chunk.title,
            r#type = chunk.document_type.as_str(),
            "Stored knowledge chunk"
        );
        Ok(chunk)
    }

    /// Fetch one chunk by id.
    pub fn get(&self, id: &str) -> Result<Option<KnowledgeChunk>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_CHUNK))?;
        let mut rows = stmt.query_map(params![id], chunk_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List all chunks, optionally filtered by category, newest first.
    pub fn list_all(&self, category: Option<&str>) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let conn = self.lock()?;
        let chunks = if let Some(cat) = category {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE category = ?1 ORDER BY created_at DESC",
                SELECT_CHUNK
            ))?;
            let rows = stmt.query_map(params![cat], chunk_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt =
                conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_CHUNK))?;
            let rows = stmt.query_map([], chunk_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        Ok(chunks)
    }

    /// Apply a partial update. Last write wins; no version check.
    ///
    /// PDF-origin chunks reject patches touching content, title, or tags.
    pub fn update(&self, id: &str, patch: ChunkPatch) -> Result<KnowledgeChunk, StoreError> {
        let mut chunk = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if chunk.document_type == DocumentType::UploadedPdf && patch.touches_protected() {
            return Err(StoreError::PdfImmutable);
        }

        if let Some(title) = patch.title {
            chunk.title = title;
        }
        if let Some(content) = patch.content {
            chunk.content = content;
        }
        if let Some(category) = patch.category {
            chunk.category = category;
        }
        if let Some(tags) = patch.tags {
            chunk.tags = tags;
        }

        let conn = self.lock()?;
        conn.execute(
            "UPDATE chunks SET title = ?1, content = ?2, category = ?3, tags = ?4 WHERE id = ?5",
            params![
                chunk.title,
                chunk.content,
                chunk.category,
                serde_json::to_string(&chunk.tags)?,
                id,
            ],
        )?;

        Ok(chunk)
    }

    /// Delete a chunk. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;

        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let embedded_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            chunk_count: chunk_count as usize,
            embedded_count: embedded_count as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

const SELECT_CHUNK: &str = "SELECT id, title, content, category, tags, document_type,
        embedding, embedding_truncated, source_file, source_size, owner_id, created_at
 FROM chunks";

fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeChunk> {
    let tags_json: String = row.get(4)?;
    let doc_type: String = row.get(5)?;
    let embedding_json: Option<String> = row.get(6)?;

    Ok(KnowledgeChunk {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        document_type: DocumentType::from_db(&doc_type),
        // A corrupt embedding column degrades to "no embedding" rather than
        // failing the whole read; the lenient ranking path tolerates it
        embedding: embedding_json.and_then(|json| serde_json::from_str(&json).ok()),
        embedding_truncated: row.get::<_, i64>(7)? != 0,
        source_file: row.get(8)?,
        source_size: row.get::<_, Option<i64>>(9)?.map(|s| s as u64),
        owner_id: row.get(10)?,
        created_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

// ============================================================================
// Briefs
// ============================================================================

/// A hand-curated brief document, embedded on the fly at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Repository of published briefs, as the composer consumes it.
pub trait BriefRepository: Send + Sync {
    fn list_published(&self) -> Result<Vec<Brief>, StoreError>;
}

/// SQLite-backed brief repository (same database file as the chunk store).
pub struct BriefStore {
    conn: Arc<Mutex<Connection>>,
}

impl BriefStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&default_db_path()?)
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS briefs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                published INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    /// Add a brief. Returns its generated id.
    pub fn add(&self, title: &str, content: &str, published: bool) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO briefs (id, title, content, published, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, title, content, published as i64, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(id = %id, title = %title, "Stored brief");
        Ok(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM briefs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

impl BriefRepository for BriefStore {
    fn list_published(&self) -> Result<Vec<Brief>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, content FROM briefs WHERE published = 1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Brief {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn default_db_path() -> Result<PathBuf, StoreError> {
    let data_dir = get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
    }
    Ok(data_dir.join("knowledge.db"))
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, ChunkStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = ChunkStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn sample_chunk(doc_type: DocumentType) -> NewChunk {
        NewChunk {
            title: "Foreign Ownership Limits".to_string(),
            content: "Condominium quota rules and the 49 percent ceiling.".to_string(),
            category: "foreign-ownership".to_string(),
            tags: vec!["condo".to_string(), "quota".to_string()],
            document_type: doc_type,
            embedding: Some(vec![0.1, 0.2, 0.3]),
            embedding_truncated: false,
            source_file: Some("ownership.pdf".to_string()),
            source_size: Some(4096),
            owner_id: Some("user-7".to_string()),
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (_dir, store) = create_test_store();

        let stored = store.insert(sample_chunk(DocumentType::UploadedText)).unwrap();
        let fetched = store.get(&stored.id).unwrap().unwrap();

        assert_eq!(fetched.title, "Foreign Ownership Limits");
        assert_eq!(fetched.tags, vec!["condo", "quota"]);
        assert_eq!(fetched.document_type, DocumentType::UploadedText);
        assert_eq!(fetched.embedding, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(fetched.source_size, Some(4096));
        assert_eq!(fetched.owner_id.as_deref(), Some("user-7"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, store) = create_test_store();
        assert!(store.get("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_list_all_with_category_filter() {
        let (_dir, store) = create_test_store();

        for category in ["foreign-ownership", "tax", "foreign-ownership"] {
            let mut chunk = sample_chunk(DocumentType::Manual);
            chunk.category = category.to_string();
            store.insert(chunk).unwrap();
        }

        assert_eq!(store.list_all(None).unwrap().len(), 3);
        assert_eq!(store.list_all(Some("foreign-ownership")).unwrap().len(), 2);
        assert_eq!(store.list_all(Some("missing")).unwrap().len(), 0);
    }

    #[test]
    fn test_update_manual_chunk() {
        let (_dir, store) = create_test_store();
        let stored = store.insert(sample_chunk(DocumentType::Manual)).unwrap();

        let updated = store
            .update(
                &stored.id,
                ChunkPatch {
                    content: Some("Revised guidance text.".to_string()),
                    tags: Some(vec!["revised".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.content, "Revised guidance text.");
        assert_eq!(updated.tags, vec!["revised"]);
        // Untouched fields persist
        assert_eq!(updated.title, "Foreign Ownership Limits");
    }

    #[test]
    fn test_update_pdf_content_rejected() {
        let (_dir, store) = create_test_store();
        let stored = store.insert(sample_chunk(DocumentType::UploadedPdf)).unwrap();

        let err = store
            .update(
                &stored.id,
                ChunkPatch {
                    content: Some("tampered".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::PdfImmutable));

        // Content unchanged
        let fetched = store.get(&stored.id).unwrap().unwrap();
        assert!(fetched.content.contains("49 percent"));
    }

    #[test]
    fn test_update_pdf_category_allowed() {
        let (_dir, store) = create_test_store();
        let stored = store.insert(sample_chunk(DocumentType::UploadedPdf)).unwrap();

        let updated = store
            .update(
                &stored.id,
                ChunkPatch {
                    category: Some("condo".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.category, "condo");
    }

    #[test]
    fn test_update_missing_chunk() {
        let (_dir, store) = create_test_store();
        let err = store.update("ghost", ChunkPatch::default()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = create_test_store();
        let stored = store.insert(sample_chunk(DocumentType::Manual)).unwrap();

        assert!(store.delete(&stored.id).unwrap());
        assert!(store.get(&stored.id).unwrap().is_none());
        assert!(!store.delete(&stored.id).unwrap());
    }

    #[test]
    fn test_chunk_without_embedding() {
        let (_dir, store) = create_test_store();
        let mut chunk = sample_chunk(DocumentType::Manual);
        chunk.embedding = None;
        let stored = store.insert(chunk).unwrap();

        let fetched = store.get(&stored.id).unwrap().unwrap();
        assert!(fetched.embedding.is_none());
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();

        let mut no_embedding = sample_chunk(DocumentType::Manual);
        no_embedding.embedding = None;
        store.insert(no_embedding).unwrap();
        store.insert(sample_chunk(DocumentType::UploadedText)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_count, 1);
        assert!(stats.total_content_bytes > 0);
    }

    #[test]
    fn test_brief_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BriefStore::open(&dir.path().join("test.db")).unwrap();

        store.add("Leasehold Basics", "Thirty-year registered leases.", true).unwrap();
        let draft_id = store.add("Draft", "Unpublished draft.", false).unwrap();

        let published = store.list_published().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].title, "Leasehold Basics");

        assert!(store.delete(&draft_id).unwrap());
    }

    #[test]
    fn test_chunk_and_brief_share_db_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.db");

        let chunks = ChunkStore::open(&path).unwrap();
        let briefs = BriefStore::open(&path).unwrap();

        chunks.insert(sample_chunk(DocumentType::Manual)).unwrap();
        briefs.add("Brief", "Body text.", true).unwrap();

        assert_eq!(chunks.list_all(None).unwrap().len(), 1);
        assert_eq!(briefs.list_published().unwrap().len(), 1);
    }
}
