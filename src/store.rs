//! SQLite persistence for documents and page content.
//!
//! All writes go through the ingestion pipeline (single-worker discipline),
//! so no locking beyond per-statement transaction isolation is needed; the
//! search path only reads. Page inserts update the FTS index in the same
//! transaction so the lexical index can never drift from the stored text.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::EmbedError;
use crate::models::{Document, DocumentStatus, OcrStatus, PageContent, TextSource};

/// A page-level candidate returned from lexical or semantic search, carrying
/// enough for fusion and snippet extraction without extra round-trips.
#[derive(Debug, Clone)]
pub struct PageCandidate {
    pub document_id: String,
    pub page_number: i64,
    pub text: String,
    pub score: f64,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Documents ============

    /// Insert a document, or return the existing id when the same content
    /// hash is already registered for the case.
    pub async fn insert_document(&self, doc: &Document) -> Result<String, sqlx::Error> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE case_id = ? AND content_hash = ?")
                .bind(&doc.case_id)
                .bind(&doc.content_hash)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, case_id, file_name, file_path, file_size, mime_type, content_hash,
                 page_count, ocr_status, ocr_error, processed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.case_id)
        .bind(&doc.file_name)
        .bind(&doc.file_path)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(&doc.content_hash)
        .bind(doc.page_count)
        .bind(doc.ocr_status.as_str())
        .bind(&doc.ocr_error)
        .bind(doc.processed_at)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;

        Ok(doc.id.clone())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| document_from_row(&row)))
    }

    /// Pending documents in registration order.
    pub async fn list_pending(&self) -> Result<Vec<Document>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE ocr_status = 'pending' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    /// Enter the PROCESSING state, clearing any previous error.
    pub async fn mark_processing(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET ocr_status = 'processing', ocr_error = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the terminal state of a run. `page_count` stays NULL when the
    /// file could not be opened at all.
    pub async fn finalize(
        &self,
        id: &str,
        status: OcrStatus,
        page_count: Option<i64>,
        error: Option<&str>,
        processed_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE documents SET ocr_status = ?, page_count = ?, ocr_error = ?, processed_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(page_count)
        .bind(error)
        .bind(processed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Destructive reset: delete all page rows (and their FTS entries) and
    /// return the document to the initial state.
    pub async fn reset_for_reprocess(&self, id: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM page_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM page_content WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE documents SET ocr_status = 'pending', ocr_error = NULL, page_count = NULL, processed_at = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn document_status(&self, id: &str) -> Result<Option<DocumentStatus>, sqlx::Error> {
        let doc = match self.get_document(id).await? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let processed_pages: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM page_content WHERE document_id = ? AND cleaned_text != ''",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(DocumentStatus {
            status: doc.ocr_status,
            page_count: doc.page_count,
            processed_pages,
            error: doc.ocr_error,
        }))
    }

    // ============ Pages ============

    pub async fn page_exists(&self, document_id: &str, page_number: i64) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM page_content WHERE document_id = ? AND page_number = ?",
        )
        .bind(document_id)
        .bind(page_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert a page row and its FTS entry in one transaction.
    pub async fn insert_page(&self, page: &PageContent) -> Result<(), sqlx::Error> {
        let blob = page.embedding.as_deref().map(vec_to_blob);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO page_content
                (document_id, case_id, page_number, raw_text, cleaned_text, word_count,
                 language, source, ocr_confidence, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&page.document_id)
        .bind(&page.case_id)
        .bind(page.page_number)
        .bind(&page.raw_text)
        .bind(&page.cleaned_text)
        .bind(page.word_count)
        .bind(&page.language)
        .bind(page.source.as_str())
        .bind(page.ocr_confidence)
        .bind(blob)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO page_fts (document_id, page_number, content) VALUES (?, ?, ?)")
            .bind(&page.document_id)
            .bind(page.page_number)
            .bind(&page.cleaned_text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn count_pages(&self, document_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM page_content WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_page(
        &self,
        document_id: &str,
        page_number: i64,
    ) -> Result<Option<PageContent>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM page_content WHERE document_id = ? AND page_number = ?",
        )
        .bind(document_id)
        .bind(page_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| page_from_row(&row)))
    }

    // ============ Search candidates ============

    /// Rank pages by the store's native full-text relevance. The FTS match
    /// string must already be sanitized; only matching rows come back.
    pub async fn lexical_candidates(
        &self,
        fts_query: &str,
        limit: i64,
    ) -> Result<Vec<PageCandidate>, sqlx::Error> {
        if fts_query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT document_id, page_number, content, rank
            FROM page_fts
            WHERE page_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(fts_query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                PageCandidate {
                    document_id: row.get("document_id"),
                    page_number: row.get("page_number"),
                    text: row.get("content"),
                    score: -rank, // bm25 rank is negative-better; flip so higher is better
                }
            })
            .collect();

        Ok(candidates)
    }

    /// Rank all embedded pages by cosine similarity to the query vector,
    /// computed in application code over the stored BLOBs.
    pub async fn semantic_candidates(
        &self,
        query_vec: &[f32],
        limit: i64,
    ) -> Result<Vec<PageCandidate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT document_id, page_number, cleaned_text, embedding FROM page_content WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<PageCandidate> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                match crate::embedding::cosine_similarity(query_vec, &vector) {
                    Ok(similarity) => Some(PageCandidate {
                        document_id: row.get("document_id"),
                        page_number: row.get("page_number"),
                        text: row.get("cleaned_text"),
                        score: similarity as f64,
                    }),
                    Err(EmbedError::DimensionMismatch { .. }) => {
                        let document_id: String = row.get("document_id");
                        tracing::warn!(
                            document = %document_id,
                            "stored embedding has stale dimensions; skipping page"
                        );
                        None
                    }
                    Err(_) => None,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit as usize);

        Ok(candidates)
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status: String = row.get("ocr_status");
    Document {
        id: row.get("id"),
        case_id: row.get("case_id"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        content_hash: row.get("content_hash"),
        page_count: row.get("page_count"),
        ocr_status: OcrStatus::parse(&status).unwrap_or(OcrStatus::Pending),
        ocr_error: row.get("ocr_error"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
    }
}

fn page_from_row(row: &sqlx::sqlite::SqliteRow) -> PageContent {
    let source: String = row.get("source");
    let blob: Option<Vec<u8>> = row.get("embedding");
    PageContent {
        document_id: row.get("document_id"),
        case_id: row.get("case_id"),
        page_number: row.get("page_number"),
        raw_text: row.get("raw_text"),
        cleaned_text: row.get("cleaned_text"),
        word_count: row.get("word_count"),
        language: row.get("language"),
        source: TextSource::parse(&source).unwrap_or(TextSource::Embedded),
        ocr_confidence: row.get("ocr_confidence"),
        embedding: blob.map(|blob| blob_to_vec(&blob)),
    }
}
