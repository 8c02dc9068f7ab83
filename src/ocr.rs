//! OCR capability interfaces and their external-tool implementations.
//!
//! The extraction pipeline treats rasterization and character recognition as
//! injected capabilities: [`PageRasterizer`] turns one PDF page into image
//! files, [`OcrEngine`] turns an image into text. The default
//! implementations shell out to poppler-utils (`pdfimages`, `pdftoppm`) and
//! `tesseract`; tests substitute deterministic doubles.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::ExtractError;

/// Recognized text for one image, with an optional engine confidence.
#[derive(Debug, Clone)]
pub struct OcrText {
    pub text: String,
    pub confidence: Option<f64>,
}

/// Opaque image-to-text capability.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<OcrText, ExtractError>;
}

/// Produces image files for a single (1-based) PDF page.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf: &Path, page: u32, out_dir: &Path)
        -> Result<Vec<PathBuf>, ExtractError>;
}

/// Handle command output, extracting stdout on success.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractError::Ocr(format!("{}: {}", error_prefix, stderr)))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractError::Io(e)),
    }
}

fn check_cmd_status(
    result: std::io::Result<std::process::ExitStatus>,
    tool_name: &str,
) -> Result<bool, ExtractError> {
    match result {
        Ok(status) => Ok(status.success()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractError::Io(e)),
    }
}

// ============ Tesseract ============

/// OCR engine backed by the system `tesseract` binary.
pub struct TesseractOcr {
    language: String,
}

impl TesseractOcr {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &Path) -> Result<OcrText, ExtractError> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        let text = handle_cmd_output(
            output,
            "tesseract (install tesseract-ocr)",
            "tesseract failed",
        )?;

        Ok(OcrText {
            text,
            confidence: None,
        })
    }
}

// ============ Poppler rasterizer ============

/// Rasterizer backed by poppler-utils.
///
/// `pdfimages` dumps the page's embedded images first, since a scanned page
/// usually carries its scan as one large embedded image. When the page has
/// no embedded images the whole page is rendered with `pdftoppm` instead.
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    fn embedded_images(
        &self,
        pdf: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let page_str = page.to_string();
        let status = Command::new("pdfimages")
            .args(["-png", "-f", &page_str, "-l", &page_str])
            .arg(pdf)
            .arg(out_dir.join("img"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if !check_cmd_status(status, "pdfimages (install poppler-utils)")? {
            return Ok(Vec::new());
        }

        collect_pngs(out_dir)
    }

    fn rendered_page(
        &self,
        pdf: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let page_str = page.to_string();
        let dpi_str = self.dpi.to_string();
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi_str, "-f", &page_str, "-l", &page_str])
            .arg(pdf)
            .arg(out_dir.join("page"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if !check_cmd_status(status, "pdftoppm (install poppler-utils)")? {
            return Err(ExtractError::Rasterize(format!(
                "pdftoppm failed to render page {}",
                page
            )));
        }

        collect_pngs(out_dir)
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn rasterize(
        &self,
        pdf: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let embedded = self.embedded_images(pdf, page, out_dir)?;
        if !embedded.is_empty() {
            return Ok(embedded);
        }
        self.rendered_page(pdf, page, out_dir)
    }
}

fn collect_pngs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Pick the image with the largest pixel area. Pages may carry several
/// embedded images (stamps, signatures, letterheads); the largest is assumed
/// to be the full-page scan. Unreadable images are skipped.
pub fn select_largest_image(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(u64, &PathBuf)> = None;
    for path in paths {
        match image::image_dimensions(path) {
            Ok((width, height)) => {
                let area = width as u64 * height as u64;
                if best.map(|(largest, _)| area > largest).unwrap_or(true) {
                    best = Some((area, path));
                }
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), error = %error, "skipping unreadable image");
            }
        }
    }
    best.map(|(_, path)| path.clone())
}

/// Report availability of the external binaries the OCR path depends on.
pub fn check_tools() -> Vec<(String, bool)> {
    ["pdfimages", "pdftoppm", "tesseract"]
        .iter()
        .map(|tool| {
            let available = Command::new(tool)
                .arg("-v")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok();
            (tool.to_string(), available)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn largest_image_wins_by_area() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_png(dir.path(), "a.png", 10, 10);
        let large = write_png(dir.path(), "b.png", 40, 30);
        let medium = write_png(dir.path(), "c.png", 20, 20);

        let selected = select_largest_image(&[small, large.clone(), medium]).unwrap();
        assert_eq!(selected, large);
    }

    #[test]
    fn unreadable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        let real = write_png(dir.path(), "real.png", 5, 5);

        let selected = select_largest_image(&[bogus, real.clone()]).unwrap();
        assert_eq!(selected, real);
    }

    #[test]
    fn no_readable_images_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        assert!(select_largest_image(&[bogus]).is_none());
        assert!(select_largest_image(&[]).is_none());
    }

    #[test]
    fn collect_pngs_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "img-000.png", 4, 4);
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let images = collect_pngs(dir.path()).unwrap();
        assert_eq!(images.len(), 1);
    }
}
