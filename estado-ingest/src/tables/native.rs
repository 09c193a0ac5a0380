//! Tables from the embedded text layer: lines split into columns on wide gaps.

use estado_core::Scored;

use super::{Table, TableBackend, TableMethod, shape_confidence, tables_from_lines};
use crate::error::TableError;
use crate::pdf::PdfDocument;

/// Score of tables whose rows all fill the same number of cells
const NATIVE_CEILING: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl TableBackend for NativeBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Native
    }

    fn extract(&self, pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        let doc = PdfDocument::load(pdf)?;
        let text = doc.page_text(page)?;
        let tables = tables_from_lines(&text);
        let confidence = shape_confidence(&tables, NATIVE_CEILING);
        Ok(Scored::new(tables, confidence))
    }
}
