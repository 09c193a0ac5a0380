//! Embedded text extraction, one page at a time.
//!
//! A page whose text layer is missing or unreadable is recorded with its
//! error and skipped; other pages are still returned.

use tracing::{debug, warn};

use crate::pdf::PdfDocument;

/// Separator placed before each page when pages are joined
pub fn page_marker(page: usize) -> String {
    format!("\n--- Page {page} ---\n")
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number
    pub page: usize,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl PageText {
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayer {
    pub pages: Vec<PageText>,
}

impl TextLayer {
    /// Pages with text, each preceded by its page marker.
    pub fn joined(&self) -> String {
        join_pages(self.pages.iter().filter_map(|p| {
            p.text
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(|t| (p.page, t))
        }))
    }

    /// 1-based numbers of pages that produced no text.
    pub fn empty_pages(&self) -> Vec<usize> {
        self.pages.iter().filter(|p| !p.has_text()).map(|p| p.page).collect()
    }

    pub fn has_text(&self) -> bool {
        self.pages.iter().any(PageText::has_text)
    }
}

/// Join `(page, text)` pairs with page markers.
pub fn join_pages<'a>(pages: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    let mut out = String::new();
    for (page, text) in pages {
        out.push_str(&page_marker(page));
        out.push_str(text.trim_end());
        out.push('\n');
    }
    out
}

pub fn extract_page(doc: &PdfDocument, index: usize) -> PageText {
    let page = index + 1;
    match doc.page_text(index) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(page, chars = text.len(), "text layer extracted");
            PageText {
                page,
                text: Some(text),
                error: None,
            }
        }
        Ok(_) => PageText {
            page,
            text: None,
            error: Some("no text layer".to_string()),
        },
        Err(e) => {
            warn!(page, error = %e, "text layer extraction failed");
            PageText {
                page,
                text: None,
                error: Some(e.to_string()),
            }
        }
    }
}

pub fn extract_text_layer(doc: &PdfDocument) -> TextLayer {
    TextLayer {
        pages: (0..doc.page_count()).map(|i| extract_page(doc, i)).collect(),
    }
}
