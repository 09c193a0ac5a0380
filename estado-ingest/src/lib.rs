//! estado-ingest: PDF access, text-layer and table extraction with an OCR
//! fallback, document classification and the CONDUSEF template parser.

pub mod classifier;
pub mod error;
pub mod ocr;
pub mod parsers;
pub mod pdf;
pub mod tables;
pub mod text_layer;

pub use classifier::{Classification, DocumentClassifier, DocumentKind, MatchTier};
pub use error::{OcrError, PdfError, TableError};
pub use ocr::{OcrEngine, OcrTableExtractor, OcrWord, PageRenderer, PdftoppmRenderer, TesseractEngine};
pub use parsers::{ParsedStatement, TableRowParser, TemplateParser};
pub use pdf::{PdfDocument, PdfMetadata, get_pdf_metadata, validate};
pub use tables::{Table, TableBackend, TableExtraction, TableExtractionEngine, TableMethod};
pub use text_layer::{TextLayer, extract_text_layer};
