//! Document registration: turns files on disk into pending document rows.
//!
//! Discovery is recursive for directories (PDFs only, sorted for stable
//! ordering), the content hash is SHA-256 over the file bytes, and the MIME
//! type is detected from content with an extension fallback. Registering the
//! same content twice for one case is a no-op returning the existing id.

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::models::{Document, OcrStatus};
use crate::store::SqliteStore;

/// Outcome of registering one file.
#[derive(Debug, Clone)]
pub struct RegisteredFile {
    pub document_id: String,
    pub file_name: String,
    pub already_registered: bool,
}

pub fn discover_pdf_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Register a file, or every PDF under a directory, as pending documents
/// for the given case.
pub async fn register_path(
    store: &SqliteStore,
    case_id: &str,
    path: &Path,
) -> Result<Vec<RegisteredFile>> {
    let files = if path.is_dir() {
        let found = discover_pdf_files(path);
        if found.is_empty() {
            anyhow::bail!("no pdf files found in {}", path.display());
        }
        found
    } else {
        vec![path.to_path_buf()]
    };

    let mut registered = Vec::with_capacity(files.len());
    for file in files {
        registered.push(register_file(store, case_id, &file).await?);
    }
    Ok(registered)
}

async fn register_file(
    store: &SqliteStore,
    case_id: &str,
    path: &Path,
) -> Result<RegisteredFile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read file: {}", path.display()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no file name: {}", path.display()))?
        .to_string();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let document = Document {
        id: Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        file_name: file_name.clone(),
        file_path: path.to_string_lossy().to_string(),
        file_size: bytes.len() as i64,
        mime_type: detect_mime(&bytes, path),
        content_hash,
        page_count: None,
        ocr_status: OcrStatus::Pending,
        ocr_error: None,
        processed_at: None,
        created_at: Utc::now().timestamp(),
    };

    let stored_id = store.insert_document(&document).await?;
    let already_registered = stored_id != document.id;
    if already_registered {
        tracing::debug!(
            file = %file_name,
            document = %stored_id,
            "file already registered for case; skipping"
        );
    }

    Ok(RegisteredFile {
        document_id: stored_id,
        file_name,
        already_registered,
    })
}

fn detect_mime(bytes: &[u8], path: &Path) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => "application/pdf".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
