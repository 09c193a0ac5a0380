//! Runs table backends page by page and falls back to OCR.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    LatticeBackend, LayoutBackend, NativeBackend, StreamBackend, Table, TableBackend,
    TableExtraction, TransactionTableDetector,
};
use crate::ocr::OcrTableExtractor;

pub struct TableExtractionEngine {
    backends: Vec<Arc<dyn TableBackend>>,
    ocr: Option<OcrTableExtractor>,
    detector: TransactionTableDetector,
    early_exit: f64,
}

impl TableExtractionEngine {
    /// A backend result above this confidence ends the search for its page
    pub const EARLY_EXIT_CONFIDENCE: f64 = 0.7;

    pub fn new(backends: Vec<Arc<dyn TableBackend>>) -> Result<Self, regex::Error> {
        Ok(Self {
            backends,
            ocr: None,
            detector: TransactionTableDetector::new()?,
            early_exit: Self::EARLY_EXIT_CONFIDENCE,
        })
    }

    /// native, lattice, stream, then `pdftotext -layout`
    pub fn with_default_backends(pdftotext: &str) -> Result<Self, regex::Error> {
        Self::new(vec![
            Arc::new(NativeBackend),
            Arc::new(LatticeBackend),
            Arc::new(StreamBackend),
            Arc::new(LayoutBackend::new(pdftotext)),
        ])
    }

    pub fn with_ocr(mut self, ocr: OcrTableExtractor) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn ocr(&self) -> Option<&OcrTableExtractor> {
        self.ocr.as_ref()
    }

    pub fn detector(&self) -> &TransactionTableDetector {
        &self.detector
    }

    /// All attempts for the 0-based `page`, best first.
    ///
    /// Backends run in order until one is confident enough. OCR runs only
    /// when no backend produced a table.
    pub fn extract_page(&self, pdf: &[u8], page: usize) -> Vec<TableExtraction> {
        let mut results = Vec::new();

        for backend in &self.backends {
            let method = backend.method();
            if !backend.is_available() {
                debug!(page = page + 1, backend = method.as_str(), "table backend unavailable");
                results.push(TableExtraction::failed(method, "backend not available"));
                continue;
            }
            match backend.extract(pdf, page) {
                Ok(scored) => {
                    let mut extraction = TableExtraction::from_scored(method, scored);
                    extraction.tables.retain(|t| !t.is_empty());
                    debug!(
                        page = page + 1,
                        backend = method.as_str(),
                        tables = extraction.tables.len(),
                        confidence = extraction.confidence,
                        "table backend finished"
                    );
                    let done = extraction.success() && extraction.confidence > self.early_exit;
                    results.push(extraction);
                    if done {
                        break;
                    }
                }
                Err(e) => {
                    warn!(page = page + 1, backend = method.as_str(), error = %e, "table backend failed");
                    results.push(TableExtraction::failed(method, e.to_string()));
                }
            }
        }

        if !results.iter().any(TableExtraction::success) {
            if let Some(ocr) = &self.ocr {
                info!(page = page + 1, "no backend found tables, running OCR");
                results.push(ocr.extract(pdf, page));
            }
        }

        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        results
    }

    /// Highest-confidence successful attempt.
    pub fn best(results: &[TableExtraction]) -> Option<&TableExtraction> {
        results
            .iter()
            .filter(|r| r.success())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn transaction_tables(&self, extraction: &TableExtraction) -> Vec<Table> {
        self.detector.filter(&extraction.tables)
    }

    /// Best tables of every page, keeping only those that look like movements.
    pub fn find_transaction_tables(&self, pdf: &[u8], page_count: usize) -> Vec<Table> {
        let mut found = Vec::new();
        for page in 0..page_count {
            let results = self.extract_page(pdf, page);
            if let Some(best) = Self::best(&results) {
                found.extend(self.transaction_tables(best));
            }
        }
        info!(tables = found.len(), "transaction tables found");
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use crate::ocr::tests::{BlankRenderer, CannedEngine, word};
    use crate::tables::TableMethod;
    use estado_core::Scored;
    use std::sync::Mutex;

    struct Fixed {
        method: TableMethod,
        confidence: f64,
        rows: usize,
        calls: Arc<Mutex<Vec<TableMethod>>>,
    }

    impl TableBackend for Fixed {
        fn method(&self) -> TableMethod {
            self.method
        }

        fn extract(&self, _pdf: &[u8], _page: usize) -> Result<Scored<Vec<Table>>, TableError> {
            self.calls.lock().unwrap().push(self.method);
            let tables = (0..self.rows)
                .map(|_| Table::new(vec![vec!["15-ENE-2023".into(), "OXXO".into(), "$55.80".into()]]))
                .collect();
            Ok(Scored::new(tables, self.confidence))
        }
    }

    fn fixed(method: TableMethod, confidence: f64, rows: usize, calls: &Arc<Mutex<Vec<TableMethod>>>) -> Arc<dyn TableBackend> {
        Arc::new(Fixed {
            method,
            confidence,
            rows,
            calls: calls.clone(),
        })
    }

    #[test]
    fn test_stops_at_confident_backend() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let engine = TableExtractionEngine::new(vec![
            fixed(TableMethod::Native, 0.5, 1, &calls),
            fixed(TableMethod::Lattice, 0.9, 1, &calls),
            fixed(TableMethod::Stream, 1.0, 1, &calls),
        ])
        .unwrap();

        let results = engine.extract_page(b"", 0);
        assert_eq!(*calls.lock().unwrap(), vec![TableMethod::Native, TableMethod::Lattice]);
        assert_eq!(results[0].method, TableMethod::Lattice);
        assert_eq!(TableExtractionEngine::best(&results).unwrap().confidence, 0.9);
    }

    #[test]
    fn test_ocr_only_when_nothing_found() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ocr = OcrTableExtractor::new(
            Arc::new(BlankRenderer),
            Arc::new(CannedEngine(vec![word("PAGO", 10, 10), word("$100.00", 200, 10)])),
        );
        let engine = TableExtractionEngine::new(vec![fixed(TableMethod::Native, 0.0, 0, &calls)])
            .unwrap()
            .with_ocr(ocr);

        let results = engine.extract_page(b"", 0);
        let best = TableExtractionEngine::best(&results).unwrap();
        assert_eq!(best.method, TableMethod::Ocr);
        assert!(best.confidence <= 0.5);

        let tables = engine.find_transaction_tables(b"", 2);
        assert_eq!(tables.len(), 2);
    }
}
