//! OCR fallback for pages without a usable text layer.
//!
//! A [`PageRenderer`] turns a PDF page into a grayscale bitmap, the bitmap is
//! cleaned up by [`preprocess::preprocess_for_ocr`], an [`OcrEngine`]
//! recognizes words with their boxes, and [`reconstruct`] rebuilds rows from
//! word positions.

pub mod preprocess;
pub mod reconstruct;
pub mod tesseract;

use std::sync::Arc;

use image::GrayImage;
use tracing::{debug, warn};

use crate::error::OcrError;
use crate::tables::{TableExtraction, TableMethod};

pub use preprocess::{PreprocessOptions, preprocess_for_ocr};
pub use reconstruct::{group_rows, rows_to_table, rows_to_text};
pub use tesseract::{PdftoppmRenderer, TesseractEngine};

/// Default recognition languages
pub const DEFAULT_LANGUAGE: &str = "spa+eng";

/// A recognized word and its bounding box in image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Engine confidence, 0-100
    pub confidence: f32,
}

/// Renders a PDF page (0-based) to a grayscale bitmap.
pub trait PageRenderer: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn render(&self, pdf: &[u8], page: usize, dpi: u32) -> Result<GrayImage, OcrError>;
}

/// Text recognition on a bitmap.
pub trait OcrEngine: Send + Sync {
    fn is_available(&self) -> bool;

    fn recognize_words(&self, image: &GrayImage, language: &str) -> Result<Vec<OcrWord>, OcrError>;

    /// Plain text, rebuilt from word positions unless the engine has a better way.
    fn recognize_text(&self, image: &GrayImage, language: &str) -> Result<String, OcrError> {
        let words = self.recognize_words(image, language)?;
        Ok(rows_to_text(&group_rows(&words, reconstruct::ROW_TOLERANCE_PX)))
    }
}

/// Renders, preprocesses and recognizes a page, then rebuilds a table from
/// the word layout.
#[derive(Clone)]
pub struct OcrTableExtractor {
    renderer: Arc<dyn PageRenderer>,
    engine: Arc<dyn OcrEngine>,
    language: String,
    dpi: u32,
    row_tolerance: f32,
}

impl OcrTableExtractor {
    /// Ceiling for the confidence of anything OCR produces
    pub const CONFIDENCE_CAP: f64 = 0.5;

    pub fn new(renderer: Arc<dyn PageRenderer>, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            renderer,
            engine,
            language: DEFAULT_LANGUAGE.to_string(),
            dpi: 300,
            row_tolerance: reconstruct::ROW_TOLERANCE_PX,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn is_available(&self) -> bool {
        self.renderer.is_available() && self.engine.is_available()
    }

    fn prepared_page(&self, pdf: &[u8], page: usize) -> Result<GrayImage, OcrError> {
        if !self.is_available() {
            return Err(OcrError::BackendNotAvailable(
                "page renderer or OCR engine missing".to_string(),
            ));
        }
        let image = self.renderer.render(pdf, page, self.dpi)?;
        Ok(preprocess_for_ocr(&image))
    }

    pub fn recognize_page(&self, pdf: &[u8], page: usize) -> Result<Vec<OcrWord>, OcrError> {
        let image = self.prepared_page(pdf, page)?;
        self.engine.recognize_words(&image, &self.language)
    }

    /// Plain OCR text of one page.
    pub fn page_text(&self, pdf: &[u8], page: usize) -> Result<String, OcrError> {
        let image = self.prepared_page(pdf, page)?;
        self.engine.recognize_text(&image, &self.language)
    }

    pub fn extract(&self, pdf: &[u8], page: usize) -> TableExtraction {
        let words = match self.recognize_page(pdf, page) {
            Ok(words) => words,
            Err(e) => {
                warn!(page = page + 1, error = %e, "OCR failed");
                return TableExtraction::failed(TableMethod::Ocr, e.to_string());
            }
        };

        let rows = group_rows(&words, self.row_tolerance);
        let text = rows_to_text(&rows);
        let tables: Vec<_> = rows_to_table(&rows).into_iter().collect();
        let confidence = if tables.is_empty() {
            0.0
        } else {
            let mean = words.iter().map(|w| f64::from(w.confidence)).sum::<f64>()
                / words.len().max(1) as f64;
            (mean / 100.0).clamp(0.0, Self::CONFIDENCE_CAP)
        };
        debug!(
            page = page + 1,
            words = words.len(),
            rows = rows.len(),
            confidence,
            "OCR table reconstructed"
        );

        TableExtraction {
            method: TableMethod::Ocr,
            tables,
            confidence,
            error: None,
            text: Some(text),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct BlankRenderer;

    impl PageRenderer for BlankRenderer {
        fn render(&self, _pdf: &[u8], _page: usize, _dpi: u32) -> Result<GrayImage, OcrError> {
            Ok(GrayImage::from_pixel(40, 40, image::Luma([255])))
        }
    }

    pub(crate) struct CannedEngine(pub Vec<OcrWord>);

    impl OcrEngine for CannedEngine {
        fn is_available(&self) -> bool {
            true
        }

        fn recognize_words(&self, _image: &GrayImage, _language: &str) -> Result<Vec<OcrWord>, OcrError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn word(text: &str, left: u32, top: u32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            left,
            top,
            width: 10 * text.len() as u32,
            height: 12,
            confidence: 90.0,
        }
    }

    #[test]
    fn test_extract_rebuilds_rows_and_caps_confidence() {
        let engine = CannedEngine(vec![
            word("OXXO", 200, 101),
            word("15-ENE-2023", 10, 100),
            word("$55.80", 500, 98),
            word("16-ENE-2023", 10, 140),
            word("PEMEX", 200, 141),
            word("$600.00", 500, 139),
        ]);
        let ocr = OcrTableExtractor::new(Arc::new(BlankRenderer), Arc::new(engine));
        let result = ocr.extract(b"%PDF", 0);

        assert!(result.success());
        assert_eq!(result.method, TableMethod::Ocr);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.tables[0].rows[0], vec!["15-ENE-2023", "OXXO", "$55.80"]);
        assert_eq!(
            result.text.as_deref(),
            Some("15-ENE-2023 OXXO $55.80\n16-ENE-2023 PEMEX $600.00")
        );
    }

    struct Unavailable;

    impl OcrEngine for Unavailable {
        fn is_available(&self) -> bool {
            false
        }

        fn recognize_words(&self, _image: &GrayImage, _language: &str) -> Result<Vec<OcrWord>, OcrError> {
            unreachable!("never called when unavailable")
        }
    }

    #[test]
    fn test_unavailable_engine_reports_error() {
        let ocr = OcrTableExtractor::new(Arc::new(BlankRenderer), Arc::new(Unavailable));
        let result = ocr.extract(b"%PDF", 0);
        assert!(!result.success());
        assert!(result.error.unwrap().contains("not available"));
    }
}
