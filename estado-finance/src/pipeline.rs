//! Statement pipeline: text per page, classification, then the extraction
//! strategies in order until one is accepted, then categorization.
//!
//! [`StatementPipeline::process`] never fails. Unreadable input, timeouts
//! and rejected strategies all end up in the returned [`ExtractionResult`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use estado_core::{ExtractionMethod, ExtractionResult, PageReport, PageTextSource};
use estado_ingest::ocr::DEFAULT_LANGUAGE;
use estado_ingest::tables::{TableMethod, render_tables_as_text};
use estado_ingest::text_layer::{extract_page, join_pages};
use estado_ingest::{
    DocumentClassifier, OcrTableExtractor, PdfDocument, TableBackend, TableExtraction,
    TableExtractionEngine, TemplateParser,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::cache::{CategoryCache, MemoryCategoryCache};
use crate::categorizer::{DEFAULT_BATCH_SIZE, TransactionCategorizer};
use crate::category_rules::CategoryRules;
use crate::llm::{LanguageModel, RetryPolicy};
use crate::llm_fallback::LlmStatementExtractor;
use crate::strategy::{
    Candidate, ExtractionContext, ExtractionStrategy, LlmFallbackStrategy, StrategyOutcome,
    TableStrategy, TemplateStrategy,
};

const TIMED_OUT: &str = "document processing timed out";

/// 0-based page searched by OCR when the card number is missing from the text
const CARD_SUFFIX_PAGE: usize = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to compile extraction patterns: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum confidence for a template result
    pub template_threshold: f64,
    /// Minimum confidence for a table or OCR result
    pub table_threshold: f64,
    pub document_timeout: Duration,
    pub ocr_language: String,
    pub render_dpi: u32,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Use the language model for categorization and fallback extraction
    pub use_llm: bool,
    pub pdftotext_command: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template_threshold: 0.6,
            table_threshold: 0.5,
            document_timeout: Duration::from_secs(120),
            ocr_language: DEFAULT_LANGUAGE.to_string(),
            render_dpi: 300,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            use_llm: true,
            pdftotext_command: "pdftotext".to_string(),
        }
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    backends: Option<Vec<Arc<dyn TableBackend>>>,
    ocr: Option<OcrTableExtractor>,
    model: Option<Arc<dyn LanguageModel>>,
    cache: Option<Arc<dyn CategoryCache>>,
    rules: Option<Arc<CategoryRules>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default native/lattice/stream/layout backends.
    pub fn table_backends(mut self, backends: Vec<Arc<dyn TableBackend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn ocr(mut self, ocr: OcrTableExtractor) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Share one category cache across documents. By default every
    /// document gets a fresh one.
    pub fn category_cache(mut self, cache: Arc<dyn CategoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn category_rules(mut self, rules: Arc<CategoryRules>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn build(self) -> Result<StatementPipeline, PipelineError> {
        let config = self.config;
        let mut engine = match self.backends {
            Some(backends) => TableExtractionEngine::new(backends)?,
            None => TableExtractionEngine::with_default_backends(&config.pdftotext_command)?,
        };
        if let Some(ocr) = self.ocr {
            engine = engine.with_ocr(ocr.with_language(config.ocr_language.clone()).with_dpi(config.render_dpi));
        }
        let engine = Arc::new(engine);
        let parser = Arc::new(TemplateParser::new()?);
        let rules = match self.rules {
            Some(rules) => rules,
            None => Arc::new(CategoryRules::mexican()?),
        };
        let model = self.model.filter(|_| config.use_llm);

        let extractor = model
            .clone()
            .map(|m| LlmStatementExtractor::new(m).with_retry(config.retry));
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(TemplateStrategy::new(Arc::clone(&parser), config.template_threshold)),
            Box::new(TableStrategy::new(
                Arc::clone(&engine),
                Arc::clone(&parser),
                config.table_threshold,
            )),
            Box::new(LlmFallbackStrategy::new(extractor, config.template_threshold)),
        ];

        Ok(StatementPipeline {
            classifier: DocumentClassifier::new()?,
            parser,
            engine,
            strategies,
            rules,
            model,
            cache: self.cache,
            config,
        })
    }
}

/// One page as read by [`read_pages`]
struct PageRead {
    report: PageReport,
    text: Option<String>,
    /// Table engine results, for pages without a text layer
    tables: Option<Vec<TableExtraction>>,
}

/// Text of every page plus what the table engine already did for the
/// pages without a text layer
struct DocumentText {
    raw_text: String,
    page_count: usize,
    page_reports: Vec<PageReport>,
    page_tables: HashMap<usize, Vec<TableExtraction>>,
}

impl DocumentText {
    fn from_pages(pages: Vec<PageRead>, page_count: usize) -> Self {
        let mut texts = Vec::new();
        let mut page_reports = Vec::with_capacity(pages.len());
        let mut page_tables = HashMap::new();
        for read in pages {
            let page = read.report.page;
            if let Some(text) = read.text {
                texts.push((page, text));
            }
            if let Some(tables) = read.tables {
                page_tables.insert(page - 1, tables);
            }
            page_reports.push(read.report);
        }
        Self {
            raw_text: join_pages(texts.iter().map(|(page, text)| (*page, text.as_str()))),
            page_count,
            page_reports,
            page_tables,
        }
    }
}

/// Fail the result for a deadline hit after extraction, keeping what it holds.
fn mark_timed_out(result: &mut ExtractionResult, stage: &str) {
    warn!(stage, "document timed out");
    result.success = false;
    if let Some(previous) = result.error.replace(TIMED_OUT.to_string()) {
        if previous != TIMED_OUT {
            result.warnings.push(previous);
        }
    }
    result.warnings.push(format!("timed out during {stage}"));
}

pub struct StatementPipeline {
    config: PipelineConfig,
    classifier: DocumentClassifier,
    parser: Arc<TemplateParser>,
    engine: Arc<TableExtractionEngine>,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    rules: Arc<CategoryRules>,
    model: Option<Arc<dyn LanguageModel>>,
    cache: Option<Arc<dyn CategoryCache>>,
}

impl StatementPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &DocumentClassifier {
        &self.classifier
    }

    pub fn categorizer(&self) -> TransactionCategorizer {
        let cache: Arc<dyn CategoryCache> = match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => Arc::new(MemoryCategoryCache::new()),
        };
        let mut categorizer = TransactionCategorizer::new(Arc::clone(&self.rules))
            .with_cache(cache)
            .with_batch_size(self.config.batch_size)
            .with_retry(self.config.retry);
        if let Some(model) = &self.model {
            categorizer = categorizer.with_model(Arc::clone(model));
        }
        categorizer
    }

    pub async fn process_path(&self, path: &Path) -> ExtractionResult {
        let filename = path.file_name().and_then(|n| n.to_str());
        match tokio::fs::read(path).await {
            Ok(bytes) => self.process(bytes, filename).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read statement");
                ExtractionResult::text_extraction_failed(format!("failed to read {}: {e}", path.display()))
            }
        }
    }

    pub async fn process(&self, pdf: impl Into<Arc<[u8]>>, filename: Option<&str>) -> ExtractionResult {
        let pdf: Arc<[u8]> = pdf.into();
        let deadline = Instant::now() + self.config.document_timeout;
        info!(bytes = pdf.len(), file = filename.unwrap_or("-"), "processing statement");

        let text = match self.read_text(Arc::clone(&pdf), deadline).await {
            Ok(text) => text,
            Err(result) => return *result,
        };

        let classification = self.classifier.classify(&text.raw_text);
        info!(
            kind = classification.kind.as_str(),
            tier = ?classification.tier,
            primary = classification.primary_hits,
            secondary = classification.secondary_hits,
            structural = classification.structural_hits,
            "document classified"
        );

        let mut ctx = ExtractionContext::new(
            Arc::clone(&pdf),
            filename.map(str::to_string),
            text.page_count,
            text.raw_text,
            classification,
            text.page_tables,
        );

        let mut accepted: Option<Candidate> = None;
        let mut best: Option<Candidate> = None;
        let mut last_method = ExtractionMethod::LlmFallback;
        let mut last_reason: Option<String> = None;

        for strategy in &self.strategies {
            debug!(strategy = strategy.name(), "attempting strategy");
            let outcome = match timeout_at(deadline, strategy.attempt(&mut ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(strategy = strategy.name(), "document timed out");
                    last_method = strategy.method();
                    last_reason = Some(TIMED_OUT.to_string());
                    break;
                }
            };
            match outcome {
                StrategyOutcome::Accepted(candidate) => {
                    info!(
                        strategy = strategy.name(),
                        confidence = candidate.confidence,
                        transactions = candidate.transactions.len(),
                        "strategy accepted"
                    );
                    accepted = Some(candidate);
                    break;
                }
                StrategyOutcome::Rejected { partial, reason } => {
                    info!(strategy = strategy.name(), reason = %reason, "strategy rejected");
                    last_method = strategy.method();
                    last_reason = Some(reason);
                    if let Some(partial) = partial {
                        if best.as_ref().is_none_or(|b| partial.confidence > b.confidence) {
                            best = Some(partial);
                        }
                    }
                }
                StrategyOutcome::Skipped(reason) => {
                    info!(strategy = strategy.name(), reason = %reason, "strategy skipped");
                }
            }
        }

        let raw_text = ctx.raw_text().to_string();
        let mut result = match (accepted, best) {
            (Some(candidate), _) => candidate.into_result(true, raw_text, None),
            (None, Some(mut partial)) => {
                partial.method = last_method;
                partial.into_result(false, raw_text, last_reason)
            }
            (None, None) => ExtractionResult::failed(
                last_method,
                raw_text,
                last_reason.unwrap_or_else(|| "no strategy produced a result".to_string()),
            ),
        };
        result.page_reports = text.page_reports;

        if result.metadata.card_last_four.is_none() && ctx.page_count() > CARD_SUFFIX_PAGE {
            match timeout_at(deadline, self.recover_card_suffix(Arc::clone(&pdf))).await {
                Ok(Some(suffix)) => {
                    info!("card suffix recovered by OCR");
                    result.metadata.card_last_four = Some(suffix);
                }
                Ok(None) => {}
                Err(_) => mark_timed_out(&mut result, "card number recovery"),
            }
        }

        if !result.transactions.is_empty() {
            let categorizer = self.categorizer();
            if timeout_at(deadline, categorizer.categorize(&mut result.transactions))
                .await
                .is_err()
            {
                mark_timed_out(&mut result, "categorization");
                // rules and cache never wait, so they still get their say
                TransactionCategorizer::new(Arc::clone(&self.rules))
                    .with_cache(categorizer.cache().clone())
                    .categorize(&mut result.transactions)
                    .await;
            }
        }

        result.enforce_sign_convention();
        info!(
            success = result.success,
            method = result.method.as_str(),
            confidence = result.confidence,
            transactions = result.transactions.len(),
            "statement processed"
        );
        result
    }

    /// Text layer per page; pages without one go through the table engine,
    /// whose OCR fallback also supplies plain text. Pages finished before the
    /// deadline are kept in the timeout result.
    async fn read_text(&self, pdf: Arc<[u8]>, deadline: Instant) -> Result<DocumentText, Box<ExtractionResult>> {
        let engine = Arc::clone(&self.engine);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || read_pages(&engine, &pdf, &tx));
        let outcome = timeout_at(deadline, task).await;

        let mut pages = Vec::new();
        while let Ok(page) = rx.try_recv() {
            pages.push(page);
        }

        let page_count = match outcome {
            Ok(Ok(Ok(page_count))) => page_count,
            Ok(Ok(Err(failed))) => return Err(failed),
            Ok(Err(e)) => {
                return Err(Box::new(ExtractionResult::text_extraction_failed(format!(
                    "text extraction task failed: {e}"
                ))));
            }
            Err(_) => {
                warn!(pages = pages.len(), "document timed out while reading text");
                let text = DocumentText::from_pages(pages, 0);
                let mut failed = ExtractionResult::text_extraction_failed(TIMED_OUT);
                failed.raw_text = text.raw_text;
                failed.page_reports = text.page_reports;
                return Err(Box::new(failed));
            }
        };

        let text = DocumentText::from_pages(pages, page_count);
        if text.raw_text.trim().is_empty() {
            let mut failed = ExtractionResult::text_extraction_failed("no text could be extracted from any page");
            failed.page_reports = text.page_reports;
            return Err(Box::new(failed));
        }
        Ok(text)
    }

    async fn recover_card_suffix(&self, pdf: Arc<[u8]>) -> Option<String> {
        let ocr = self.engine.ocr()?.clone();
        if !ocr.is_available() {
            return None;
        }
        let parser = Arc::clone(&self.parser);
        tokio::task::spawn_blocking(move || match ocr.page_text(&pdf, CARD_SUFFIX_PAGE) {
            Ok(text) => parser.find_card_suffix(&text),
            Err(e) => {
                debug!(error = %e, "OCR of the card page failed");
                None
            }
        })
        .await
        .ok()
        .flatten()
    }
}

/// Sends one [`PageRead`] per page as soon as it is done and returns the
/// page count. Stops early once the receiver is gone.
fn read_pages(
    engine: &TableExtractionEngine,
    pdf: &[u8],
    tx: &mpsc::UnboundedSender<PageRead>,
) -> Result<usize, Box<ExtractionResult>> {
    let doc = PdfDocument::load(pdf).map_err(|e| {
        warn!(error = %e, "unreadable PDF");
        Box::new(ExtractionResult::text_extraction_failed(format!("unreadable PDF: {e}")))
    })?;
    let page_count = doc.page_count();
    if page_count == 0 {
        warn!("PDF has no pages");
        return Err(Box::new(ExtractionResult::text_extraction_failed("PDF has no pages")));
    }

    for index in 0..page_count {
        let page = extract_page(&doc, index);
        let read = match page.text {
            Some(text) => PageRead {
                report: PageReport {
                    page: index + 1,
                    source: PageTextSource::TextLayer,
                    chars: text.len(),
                    error: None,
                },
                text: Some(text),
                tables: None,
            },
            None => {
                debug!(page = index + 1, "no text layer, trying tables");
                let results = engine.extract_page(pdf, index);
                match page_text_from_tables(&results) {
                    Some((source, text)) => PageRead {
                        report: PageReport {
                            page: index + 1,
                            source,
                            chars: text.len(),
                            error: None,
                        },
                        text: Some(text),
                        tables: Some(results),
                    },
                    None => {
                        let error = results
                            .iter()
                            .find_map(|r| r.error.clone())
                            .or(page.error)
                            .unwrap_or_else(|| "no text found".to_string());
                        warn!(page = index + 1, error = %error, "no text for page");
                        PageRead {
                            report: PageReport {
                                page: index + 1,
                                source: PageTextSource::None,
                                chars: 0,
                                error: Some(error),
                            },
                            text: None,
                            tables: Some(results),
                        }
                    }
                }
            }
        };
        if tx.send(read).is_err() {
            debug!(page = index + 1, "text reader abandoned");
            break;
        }
    }
    Ok(page_count)
}

fn page_text_from_tables(results: &[TableExtraction]) -> Option<(PageTextSource, String)> {
    if let Some(best) = TableExtractionEngine::best(results) {
        return Some(match best.method {
            TableMethod::Ocr => (
                PageTextSource::Ocr,
                best.text.clone().unwrap_or_else(|| render_tables_as_text(&best.tables)),
            ),
            _ => (PageTextSource::Tables, render_tables_as_text(&best.tables)),
        });
    }
    results
        .iter()
        .filter(|r| r.method == TableMethod::Ocr)
        .find_map(|r| r.text.clone())
        .filter(|t| !t.trim().is_empty())
        .map(|t| (PageTextSource::Ocr, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = PipelineConfig::default();
        assert_eq!(c.template_threshold, 0.6);
        assert_eq!(c.document_timeout, Duration::from_secs(120));
        assert_eq!(c.ocr_language, "spa+eng");
        assert_eq!(c.batch_size, 40);
        assert_eq!(c.retry.attempts, 3);
    }

    #[test]
    fn test_page_text_prefers_successful_tables() {
        let results = vec![
            TableExtraction::failed(TableMethod::Native, "no text layer"),
            TableExtraction {
                method: TableMethod::Ocr,
                tables: Vec::new(),
                confidence: 0.0,
                error: None,
                text: Some("SALDO ANTERIOR 100.00".to_string()),
            },
        ];
        let (source, text) = page_text_from_tables(&results).unwrap();
        assert_eq!(source, PageTextSource::Ocr);
        assert!(text.contains("SALDO"));

        assert!(page_text_from_tables(&[TableExtraction::failed(TableMethod::Lattice, "x")]).is_none());
    }

    #[tokio::test]
    async fn test_unreadable_input() {
        let pipeline = StatementPipeline::builder()
            .table_backends(Vec::new())
            .build()
            .unwrap();
        for bytes in [Vec::new(), b"definitely not a pdf".to_vec()] {
            let r = pipeline.process(bytes, None).await;
            assert!(!r.success);
            assert_eq!(r.method, ExtractionMethod::TextExtractionFailed);
            assert_eq!(r.confidence, 0.0);
            assert!(r.error.is_some());
        }
    }
}
