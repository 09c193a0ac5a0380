//! Command-line OCR backends: `pdftoppm` for rendering and `tesseract` for
//! recognition. Both work through a temporary directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::GrayImage;
use tempfile::TempDir;
use tracing::debug;

use super::{OcrEngine, OcrWord, PageRenderer};
use crate::error::OcrError;

/// Tesseract OCR through its CLI
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: String,
    /// Page segmentation mode; 6 assumes a uniform block of text
    psm: u8,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            psm: 6,
        }
    }

    fn run(&self, image: &GrayImage, language: &str, tsv: bool) -> Result<String, OcrError> {
        let dir = TempDir::new()?;
        let image_path = dir.path().join("page.png");
        image.save(&image_path)?;

        let psm = self.psm.to_string();
        let mut cmd = Command::new(&self.command);
        cmd.arg(&image_path)
            .arg("stdout")
            .args(["-l", language, "--psm", &psm]);
        if tsv {
            cmd.arg("tsv");
        }

        match cmd.output() {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => Err(OcrError::Failed(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(format!(
                "{} not found (install tesseract-ocr)",
                self.command
            ))),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractEngine {
    fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    fn recognize_words(&self, image: &GrayImage, language: &str) -> Result<Vec<OcrWord>, OcrError> {
        let tsv = self.run(image, language, true)?;
        let words = parse_tsv(&tsv);
        debug!(words = words.len(), "tesseract recognized words");
        Ok(words)
    }

    fn recognize_text(&self, image: &GrayImage, language: &str) -> Result<String, OcrError> {
        self.run(image, language, false)
    }
}

/// Word rows of tesseract's TSV output (level 5 entries with text).
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            let text = cols[11].trim();
            let confidence: f32 = cols[10].trim().parse().ok()?;
            if text.is_empty() || confidence < 0.0 {
                return None;
            }
            Some(OcrWord {
                text: text.to_string(),
                left: cols[6].trim().parse().ok()?,
                top: cols[7].trim().parse().ok()?,
                width: cols[8].trim().parse().ok()?,
                height: cols[9].trim().parse().ok()?,
                confidence,
            })
        })
        .collect()
}

/// Poppler's `pdftoppm` page rasterizer
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    command: String,
}

impl PdftoppmRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    fn render(&self, pdf: &[u8], page: usize, dpi: u32) -> Result<GrayImage, OcrError> {
        let dir = TempDir::new()?;
        let pdf_path = dir.path().join("input.pdf");
        std::fs::write(&pdf_path, pdf)?;

        let number = page + 1;
        let page_str = number.to_string();
        let dpi_str = dpi.to_string();
        let status = Command::new(&self.command)
            .args(["-png", "-gray", "-r", &dpi_str, "-f", &page_str, "-l", &page_str])
            .arg(&pdf_path)
            .arg(dir.path().join("page"))
            .status();

        match status {
            Ok(s) if s.success() => {
                let path = find_page_image(dir.path(), number)
                    .ok_or_else(|| OcrError::Failed(format!("no image generated for page {number}")))?;
                Ok(image::open(path)?.to_luma8())
            }
            Ok(_) => Err(OcrError::Failed(format!("{} failed on page {number}", self.command))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(format!(
                "{} not found (install poppler-utils)",
                self.command
            ))),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

/// pdftoppm zero-pads the page number to the width of the page count.
fn find_page_image(dir: &Path, page: usize) -> Option<PathBuf> {
    (1..=4)
        .map(|digits| dir.join(format!("page-{:0width$}.png", page, width = digits)))
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tsv_keeps_words_only() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t120\t300\t180\t40\t91.5\t15-ENE-2023\n\
                   5\t1\t1\t1\t1\t2\t420\t302\t120\t40\t88\tOXXO\n\
                   5\t1\t1\t1\t1\t3\t600\t302\t10\t40\t12\t \n";
        let words = parse_tsv(tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "15-ENE-2023");
        assert_eq!(words[0].left, 120);
        assert_eq!(words[1].top, 302);
        assert_eq!(words[1].confidence, 88.0);
    }

    #[test]
    fn test_find_page_image_padding() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("page-02.png"), b"x").unwrap();
        assert_eq!(find_page_image(dir.path(), 2), Some(dir.path().join("page-02.png")));
        assert_eq!(find_page_image(dir.path(), 3), None);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("estado-no-such-tesseract");
        assert!(!engine.is_available());
        let img = GrayImage::new(4, 4);
        assert!(matches!(
            engine.recognize_words(&img, "spa"),
            Err(OcrError::BackendNotAvailable(_))
        ));
    }
}
