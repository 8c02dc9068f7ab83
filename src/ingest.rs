//! Ingestion pipeline: extraction → page rows → best-effort embeddings →
//! document status.
//!
//! The terminal status is decided after every page has been attempted:
//! all pages succeeded → `Completed`; none → `Failed`; a mix →
//! `ManualReview` with the failed-page count in the error message. A file
//! that cannot be opened fails the whole document with no pages produced.
//!
//! Extraction failures never escape this module as errors: they land in
//! the document's status and `ocr_error` field, and callers observe them by
//! polling status.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::EmbeddingGenerator;
use crate::error::PipelineError;
use crate::extract::{ExtractedPage, TextExtractor};
use crate::models::{OcrStatus, PageContent};
use crate::store::SqliteStore;

/// Final accounting for one pipeline run, mirrored into the job result.
#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub status: OcrStatus,
    pub pages_total: usize,
    pub pages_failed: usize,
    pub pages_embedded: usize,
}

pub struct IngestionPipeline {
    store: SqliteStore,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<EmbeddingGenerator>,
    language: String,
}

impl IngestionPipeline {
    pub fn new(
        store: SqliteStore,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<EmbeddingGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            language: config.extraction.ocr_language.clone(),
        }
    }

    /// Run one document through extraction and persistence.
    pub async fn process_document(
        &self,
        document_id: &str,
    ) -> Result<IngestionSummary, PipelineError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(document_id.to_string()))?;

        self.store.mark_processing(document_id).await?;

        let extractor = Arc::clone(&self.extractor);
        let path = PathBuf::from(&doc.file_path);
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|error| PipelineError::Task(error.to_string()))?;

        let extraction = match extracted {
            Ok(extraction) => extraction,
            Err(error) => {
                // Fatal to the whole document; no pages were produced.
                let message = error.to_string();
                tracing::warn!(document = %document_id, error = %message, "extraction failed");
                self.store
                    .finalize(
                        document_id,
                        OcrStatus::Failed,
                        None,
                        Some(&message),
                        Utc::now().timestamp(),
                    )
                    .await?;
                return Ok(IngestionSummary {
                    status: OcrStatus::Failed,
                    pages_total: 0,
                    pages_failed: 0,
                    pages_embedded: 0,
                });
            }
        };

        let pages_total = extraction.pages.len();
        let pages_failed = extraction
            .pages
            .iter()
            .filter(|page| !page.succeeded())
            .count();

        let mut pages_embedded = 0usize;
        for page in &extraction.pages {
            if self
                .store
                .page_exists(document_id, page.page_number as i64)
                .await?
            {
                // Safe resume after a crash mid-run: the row is already there.
                continue;
            }

            let embedding = self.embed_page(document_id, page).await;
            if embedding.is_some() {
                pages_embedded += 1;
            }

            self.store
                .insert_page(&PageContent {
                    document_id: document_id.to_string(),
                    case_id: doc.case_id.clone(),
                    page_number: page.page_number as i64,
                    raw_text: page.raw_text.clone(),
                    cleaned_text: page.cleaned_text.clone(),
                    word_count: page.word_count as i64,
                    language: self.language.clone(),
                    source: page.source,
                    ocr_confidence: page.ocr_confidence,
                    embedding,
                })
                .await?;
        }

        let (status, error) = terminal_state(pages_total, pages_failed);
        self.store
            .finalize(
                document_id,
                status,
                Some(pages_total as i64),
                error.as_deref(),
                Utc::now().timestamp(),
            )
            .await?;

        tracing::info!(
            document = %document_id,
            status = status.as_str(),
            pages = pages_total,
            failed = pages_failed,
            embedded = pages_embedded,
            "ingestion run finished"
        );

        Ok(IngestionSummary {
            status,
            pages_total,
            pages_failed,
            pages_embedded,
        })
    }

    /// Destructive retry: delete all existing pages, reset the document to
    /// the initial state, and run the same pipeline again.
    pub async fn reprocess(&self, document_id: &str) -> Result<IngestionSummary, PipelineError> {
        if self.store.get_document(document_id).await?.is_none() {
            return Err(PipelineError::NotFound(document_id.to_string()));
        }
        self.store.reset_for_reprocess(document_id).await?;
        self.process_document(document_id).await
    }

    /// Best-effort embedding: a failure is logged and the page is stored
    /// without a vector; it does not count as a page failure.
    async fn embed_page(&self, document_id: &str, page: &ExtractedPage) -> Option<Vec<f32>> {
        if !page.succeeded() || !self.embedder.should_embed(&page.cleaned_text) {
            return None;
        }

        match self.embedder.embed(&page.cleaned_text).await {
            Ok(vector) => Some(vector),
            Err(error) => {
                tracing::warn!(
                    document = %document_id,
                    page = page.page_number,
                    error = %error,
                    "embedding failed; storing page without vector"
                );
                None
            }
        }
    }
}

fn terminal_state(pages_total: usize, pages_failed: usize) -> (OcrStatus, Option<String>) {
    if pages_total == 0 {
        return (
            OcrStatus::Failed,
            Some("document produced no pages".to_string()),
        );
    }
    if pages_failed == 0 {
        return (OcrStatus::Completed, None);
    }
    if pages_failed == pages_total {
        return (
            OcrStatus::Failed,
            Some(format!("all {} pages failed extraction", pages_total)),
        );
    }
    (
        OcrStatus::ManualReview,
        Some(format!(
            "{} of {} pages failed extraction; manual review required",
            pages_failed, pages_total
        )),
    )
}
