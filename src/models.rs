//! Core data models for the ingestion and retrieval pipeline.
//!
//! These types represent the documents, per-page content rows, and case
//! metadata that flow between extraction, storage, and search.

use serde::Serialize;

/// Processing status of a registered document.
///
/// Transitions: `Pending → Processing → {Completed, Failed, ManualReview}`.
/// Reprocessing resets a document to `Pending` after deleting its pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    ManualReview,
}

impl OcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrStatus::Pending => "pending",
            OcrStatus::Processing => "processing",
            OcrStatus::Completed => "completed",
            OcrStatus::Failed => "failed",
            OcrStatus::ManualReview => "manual_review",
        }
    }

    pub fn parse(value: &str) -> Option<OcrStatus> {
        match value {
            "pending" => Some(OcrStatus::Pending),
            "processing" => Some(OcrStatus::Processing),
            "completed" => Some(OcrStatus::Completed),
            "failed" => Some(OcrStatus::Failed),
            "manual_review" => Some(OcrStatus::ManualReview),
            _ => None,
        }
    }
}

/// Which extraction path produced a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextSource {
    Embedded,
    Ocr,
}

impl TextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextSource::Embedded => "embedded",
            TextSource::Ocr => "ocr",
        }
    }

    pub fn parse(value: &str) -> Option<TextSource> {
        match value {
            "embedded" => Some(TextSource::Embedded),
            "ocr" => Some(TextSource::Ocr),
            _ => None,
        }
    }
}

/// A registered source file belonging to a case.
///
/// `page_count` stays NULL until extraction completes (success or partial);
/// `ocr_error` carries the terminal error message when the state machine
/// lands on `Failed` or `ManualReview`.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub case_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub content_hash: String,
    pub page_count: Option<i64>,
    pub ocr_status: OcrStatus,
    pub ocr_error: Option<String>,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

/// One extracted page of a document, unique per (document_id, page_number).
///
/// The embedding is populated only when the cleaned text passes the minimum
/// length threshold and the provider call succeeded; a NULL embedding keeps
/// the page fully searchable through the lexical index.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub document_id: String,
    pub case_id: String,
    pub page_number: i64,
    pub raw_text: String,
    pub cleaned_text: String,
    pub word_count: i64,
    pub language: String,
    pub source: TextSource,
    pub ocr_confidence: Option<f64>,
    pub embedding: Option<Vec<f32>>,
}

/// Tribunal case metadata, owned by the external case registry and joined
/// onto search results at query time.
#[derive(Debug, Clone, Serialize)]
pub struct CaseMetadata {
    pub case_number: String,
    pub appellant: String,
    pub respondent: String,
    pub filed_on: Option<String>,
    pub decided_on: Option<String>,
    pub outcome: Option<String>,
    pub chairperson: Option<String>,
    pub board_members: Vec<String>,
    pub tax_amount: Option<f64>,
}

/// Snapshot of a document's ingestion progress for status polling.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatus {
    pub status: OcrStatus,
    pub page_count: Option<i64>,
    pub processed_pages: i64,
    pub error: Option<String>,
}
