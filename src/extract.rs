//! Per-page text extraction for legal PDFs.
//!
//! A document is classified once, at document level: if the embedded text
//! across all pages (page separators stripped) reaches a minimum length the
//! PDF is treated as born-digital and its embedded text is used directly;
//! otherwise every page is rasterized and run through OCR. The decision is
//! deliberately not per-page, since a partially scanned hybrid would otherwise
//! flip strategies mid-document.
//!
//! Cleaning is applied uniformly regardless of source: whitespace runs
//! collapse to single spaces, control characters are dropped, 3+ periods
//! become an ellipsis, 3+ newlines become a blank line.

use std::path::Path;
use std::sync::Arc;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::models::TextSource;
use crate::ocr::{select_largest_image, OcrEngine, PageRasterizer, PopplerRasterizer, TesseractOcr};

/// One extracted page. A page with `error` set failed extraction and
/// carries empty text; extraction continues for the remaining pages.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub raw_text: String,
    pub cleaned_text: String,
    pub word_count: usize,
    pub source: TextSource,
    pub ocr_confidence: Option<f64>,
    pub error: Option<String>,
}

impl ExtractedPage {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Which document-level strategy the extractor chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Embedded,
    Ocr,
}

/// Ordered per-page extraction result for one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub strategy: ExtractionStrategy,
    pub pages: Vec<ExtractedPage>,
}

/// Document-to-pages extraction capability, injected into the pipeline so
/// tests can substitute deterministic page sets.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// Default extractor: embedded text via `pdf_extract`, OCR fallback via the
/// injected rasterizer and engine.
pub struct PdfTextExtractor {
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    min_embedded_chars: usize,
}

impl PdfTextExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            ocr: Arc::new(TesseractOcr::new(&config.ocr_language)),
            rasterizer: Arc::new(PopplerRasterizer::new(config.ocr_dpi)),
            min_embedded_chars: config.min_embedded_chars,
        }
    }

    pub fn with_engines(
        config: &ExtractionConfig,
        ocr: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            min_embedded_chars: config.min_embedded_chars,
        }
    }

    fn ocr_page(&self, path: &Path, page_number: u32) -> Result<crate::ocr::OcrText, ExtractError> {
        let scratch = tempfile::tempdir()?;
        let images = self.rasterizer.rasterize(path, page_number, scratch.path())?;
        let largest = select_largest_image(&images).ok_or_else(|| {
            ExtractError::Rasterize(format!("page {} produced no readable images", page_number))
        })?;
        self.ocr.recognize(&largest)
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        // pdf-extract handles ToUnicode CMaps and custom font encodings,
        // which raw lopdf text extraction does not.
        let page_texts = pdf_extract::extract_text_by_pages(path)
            .map_err(|error| ExtractError::FileOpen(format!("{}: {}", path.display(), error)))?;

        let embedded_total: usize = page_texts.iter().map(|text| measurable_len(text)).sum();

        if embedded_total >= self.min_embedded_chars {
            let pages = page_texts
                .iter()
                .enumerate()
                .map(|(index, text)| embedded_page(index as u32 + 1, text))
                .collect();
            return Ok(Extraction {
                strategy: ExtractionStrategy::Embedded,
                pages,
            });
        }

        let mut pages = Vec::with_capacity(page_texts.len());
        for index in 0..page_texts.len() {
            let page_number = index as u32 + 1;
            match self.ocr_page(path, page_number) {
                Ok(recognized) => {
                    pages.push(recognized_page(
                        page_number,
                        &recognized.text,
                        recognized.confidence,
                    ));
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        page = page_number,
                        error = %error,
                        "page ocr failed; recording page as failed"
                    );
                    pages.push(failed_page(page_number, &error.to_string()));
                }
            }
        }

        Ok(Extraction {
            strategy: ExtractionStrategy::Ocr,
            pages,
        })
    }
}

fn embedded_page(page_number: u32, raw: &str) -> ExtractedPage {
    let cleaned = clean_text(raw);
    let word_count = word_count(&cleaned);
    ExtractedPage {
        page_number,
        raw_text: raw.to_string(),
        cleaned_text: cleaned,
        word_count,
        source: TextSource::Embedded,
        ocr_confidence: None,
        error: None,
    }
}

fn recognized_page(page_number: u32, raw: &str, confidence: Option<f64>) -> ExtractedPage {
    let cleaned = clean_text(raw);
    let word_count = word_count(&cleaned);
    ExtractedPage {
        page_number,
        raw_text: raw.to_string(),
        cleaned_text: cleaned,
        word_count,
        source: TextSource::Ocr,
        ocr_confidence: confidence,
        error: None,
    }
}

fn failed_page(page_number: u32, error: &str) -> ExtractedPage {
    ExtractedPage {
        page_number,
        raw_text: String::new(),
        cleaned_text: String::new(),
        word_count: 0,
        source: TextSource::Ocr,
        ocr_confidence: None,
        error: Some(error.to_string()),
    }
}

/// Characters counted toward the born-digital decision: page separator
/// markers are stripped and the remainder trimmed first.
fn measurable_len(text: &str) -> usize {
    text.replace('\u{000c}', " ").trim().chars().count()
}

/// Normalize extracted text: collapse space/tab runs to one space, drop
/// control characters (newlines survive), collapse 3+ periods to `...`,
/// collapse 3+ newlines to a blank line, trim.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut spaces = 0usize;
    let mut newlines = 0usize;
    let mut periods = 0usize;

    fn flush_periods(out: &mut String, periods: usize) {
        if periods >= 3 {
            out.push_str("...");
        } else {
            for _ in 0..periods {
                out.push('.');
            }
        }
    }

    for ch in raw.chars() {
        let ch = match ch {
            '\t' | '\u{a0}' => ' ',
            '\r' => continue,
            other => other,
        };

        if ch == '\n' {
            flush_periods(&mut out, periods);
            periods = 0;
            newlines += 1;
            spaces = 0;
            continue;
        }
        if ch == ' ' {
            flush_periods(&mut out, periods);
            periods = 0;
            spaces += 1;
            continue;
        }
        if ch.is_control() {
            continue;
        }

        if newlines > 0 {
            if !out.is_empty() {
                for _ in 0..newlines.min(2) {
                    out.push('\n');
                }
            }
            newlines = 0;
            spaces = 0;
        } else if spaces > 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            spaces = 0;
        }

        if ch == '.' {
            periods += 1;
        } else {
            flush_periods(&mut out, periods);
            periods = 0;
            out.push(ch);
        }
    }

    flush_periods(&mut out, periods);
    out
}

/// Word count over cleaned text: whitespace-split, empty tokens discarded.
pub fn word_count(cleaned: &str) -> usize {
    cleaned.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrText;
    use std::path::PathBuf;

    #[test]
    fn cleaning_collapses_space_runs() {
        assert_eq!(clean_text("a   \t  b"), "a b");
    }

    #[test]
    fn cleaning_collapses_period_runs() {
        assert_eq!(clean_text("see para 4....."), "see para 4...");
        assert_eq!(clean_text("end.."), "end..");
    }

    #[test]
    fn cleaning_collapses_newline_runs() {
        assert_eq!(clean_text("one\n\n\n\ntwo"), "one\n\ntwo");
        assert_eq!(clean_text("one\ntwo"), "one\ntwo");
    }

    #[test]
    fn cleaning_drops_control_characters_and_trims() {
        assert_eq!(clean_text("  \u{0}judgment\u{7}  \n"), "judgment");
    }

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("the  appeal   is allowed"), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn measurable_len_strips_page_separators() {
        assert_eq!(measurable_len("\u{000c}\u{000c}  "), 0);
        assert_eq!(measurable_len("abc\u{000c}def"), 7);
    }

    // Minimal single-page PDF with an empty content stream: structurally
    // valid, no embedded text, so extraction takes the OCR branch.
    fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let mut offsets = Vec::new();

        offsets.push(out.len());
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

        let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + i * 2)).collect();
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
                kids.join(" "),
                pages
            )
            .as_bytes(),
        );

        for i in 0..pages {
            let page_obj = 3 + i * 2;
            let content_obj = page_obj + 1;
            offsets.push(out.len());
            out.extend_from_slice(
                format!(
                    "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> /Contents {} 0 R >> endobj\n",
                    page_obj, content_obj
                )
                .as_bytes(),
            );
            offsets.push(out.len());
            out.extend_from_slice(
                format!("{} 0 obj << /Length 0 >> stream\n\nendstream endobj\n", content_obj)
                    .as_bytes(),
            );
        }

        let xref_start = out.len();
        let count = offsets.len() + 1;
        out.extend_from_slice(format!("xref\n0 {}\n", count).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in &offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", count).as_bytes(),
        );
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    struct FakeRasterizer;

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(
            &self,
            _pdf: &Path,
            page: u32,
            out_dir: &Path,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            let path = out_dir.join(format!("img-{:03}.png", page));
            image::RgbImage::new(8, 8).save(&path).map_err(|e| {
                ExtractError::Rasterize(e.to_string())
            })?;
            Ok(vec![path])
        }
    }

    struct FakeOcr {
        fail_page: Option<u32>,
    }

    impl OcrEngine for FakeOcr {
        fn recognize(&self, image: &Path) -> Result<OcrText, ExtractError> {
            // Fake rasterizer encodes the page number in the file name.
            let name = image.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let page: u32 = name.trim_start_matches("img-").parse().unwrap_or(0);
            if self.fail_page == Some(page) {
                return Err(ExtractError::Ocr(format!("engine error on page {}", page)));
            }
            Ok(OcrText {
                text: format!("recognized text of page {}", page),
                confidence: Some(0.9),
            })
        }
    }

    fn scanned_extractor(fail_page: Option<u32>) -> PdfTextExtractor {
        PdfTextExtractor::with_engines(
            &ExtractionConfig::default(),
            Arc::new(FakeOcr { fail_page }),
            Arc::new(FakeRasterizer),
        )
    }

    #[test]
    fn scanned_document_goes_through_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, blank_pdf(2)).unwrap();

        let extraction = scanned_extractor(None).extract(&pdf).unwrap();
        assert_eq!(extraction.strategy, ExtractionStrategy::Ocr);
        assert_eq!(extraction.pages.len(), 2);
        assert!(extraction.pages.iter().all(|p| p.succeeded()));
        assert_eq!(extraction.pages[0].cleaned_text, "recognized text of page 1");
        assert_eq!(extraction.pages[1].source, TextSource::Ocr);
        assert_eq!(extraction.pages[1].ocr_confidence, Some(0.9));
    }

    #[test]
    fn page_failure_does_not_stop_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, blank_pdf(3)).unwrap();

        let extraction = scanned_extractor(Some(2)).extract(&pdf).unwrap();
        assert_eq!(extraction.pages.len(), 3);
        assert!(extraction.pages[0].succeeded());
        assert!(!extraction.pages[1].succeeded());
        assert!(extraction.pages[2].succeeded());
        assert_eq!(extraction.pages[1].word_count, 0);
        assert!(extraction.pages[1].cleaned_text.is_empty());
    }

    #[test]
    fn missing_file_is_a_file_open_error() {
        let extractor = scanned_extractor(None);
        let result = extractor.extract(Path::new("/nonexistent/file.pdf"));
        assert!(matches!(result, Err(ExtractError::FileOpen(_))));
    }

    #[test]
    fn garbage_bytes_are_a_file_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%broken").unwrap();

        let result = scanned_extractor(None).extract(&pdf);
        assert!(matches!(result, Err(ExtractError::FileOpen(_))));
    }
}
