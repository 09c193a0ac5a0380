use thiserror::Error;

/// Input that cannot be read as a PDF
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF content is empty")]
    Empty,
    #[error("failed to open PDF: {0}")]
    Load(String),
    #[error("PDF has no pages")]
    NoPages,
    #[error("page {0} not found")]
    PageNotFound(usize),
    #[error("page {page}: {message}")]
    Content { page: usize, message: String },
}

impl From<lopdf::Error> for PdfError {
    fn from(err: lopdf::Error) -> Self {
        PdfError::Load(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),
    #[error("OCR failed: {0}")]
    Failed(String),
    #[error("image error: {0}")]
    Image(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for OcrError {
    fn from(err: image::ImageError) -> Self {
        OcrError::Image(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("table backend not available: {0}")]
    BackendNotAvailable(String),
    #[error("table extraction failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
