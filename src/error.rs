use thiserror::Error;

/// Errors raised while extracting text from a source document.
///
/// `FileOpen` is fatal to the whole document; the rasterization and OCR
/// variants are page-scoped and captured into per-page failure records by
/// the extractor rather than propagated.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open document: {0}")]
    FileOpen(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("page rasterization failed: {0}")]
    Rasterize(String),

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by embedding providers and the generator around them.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed empty text")]
    EmptyText,

    #[error("embedding provider not ready: {0}")]
    NotReady(String),

    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    #[error("embedding request failed: {0}")]
    Provider(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the ingestion pipeline itself.
///
/// Extraction failures are not represented here: they are folded into the
/// document's status and `ocr_error` field, so callers observe them by
/// polling status rather than catching an error from the pipeline call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Errors raised when enqueueing or inspecting jobs.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("job queue worker is not running")]
    Closed,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Errors surfaced synchronously to callers of `search`.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query is empty")]
    EmptyQuery,

    #[error("unknown search mode: {0}")]
    UnknownMode(String),

    #[error("query embedding failed: {0}")]
    QueryEmbedding(#[from] EmbedError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
