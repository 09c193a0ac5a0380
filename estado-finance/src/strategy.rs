//! Extraction strategies tried in order by the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use estado_core::{
    ExtractionMethod, ExtractionResult, InstallmentPlan, StatementMetadata, Transaction, mean,
    ratio,
};
use estado_ingest::parsers::condusef::MAX_TRANSACTIONS;
use estado_ingest::tables::render_tables_as_text;
use estado_ingest::{
    Classification, ParsedStatement, Table, TableExtraction, TableExtractionEngine, TableRowParser,
    TemplateParser,
};
use tracing::{debug, warn};

use crate::llm_fallback::LlmStatementExtractor;

/// Per-document state shared by the strategies
pub struct ExtractionContext {
    pdf: Arc<[u8]>,
    filename: Option<String>,
    page_count: usize,
    raw_text: String,
    classification: Classification,
    /// Template parse of `raw_text`, made once
    template: Option<ParsedStatement>,
    /// Table engine results per 0-based page
    page_tables: HashMap<usize, Vec<TableExtraction>>,
}

impl ExtractionContext {
    pub fn new(
        pdf: Arc<[u8]>,
        filename: Option<String>,
        page_count: usize,
        raw_text: String,
        classification: Classification,
        page_tables: HashMap<usize, Vec<TableExtraction>>,
    ) -> Self {
        Self {
            pdf,
            filename,
            page_count,
            raw_text,
            classification,
            template: None,
            page_tables,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn template(&mut self, parser: &TemplateParser) -> &ParsedStatement {
        self.template
            .get_or_insert_with(|| parser.parse(&self.raw_text, self.filename.as_deref()))
    }

    /// Best tables of every page that look like movements. Pages the engine
    /// has not seen yet are processed off the async runtime.
    pub async fn transaction_tables(&mut self, engine: &Arc<TableExtractionEngine>) -> Vec<Table> {
        let missing: Vec<usize> = (0..self.page_count)
            .filter(|p| !self.page_tables.contains_key(p))
            .collect();
        if !missing.is_empty() {
            let task_engine = Arc::clone(engine);
            let pdf = Arc::clone(&self.pdf);
            let task = tokio::task::spawn_blocking(move || {
                missing
                    .into_iter()
                    .map(|page| (page, task_engine.extract_page(&pdf, page)))
                    .collect::<Vec<_>>()
            });
            match task.await {
                Ok(pages) => self.page_tables.extend(pages),
                Err(e) => warn!(error = %e, "table extraction task failed"),
            }
        }

        let mut tables = Vec::new();
        for page in 0..self.page_count {
            let Some(results) = self.page_tables.get(&page) else {
                continue;
            };
            if let Some(best) = TableExtractionEngine::best(results) {
                tables.extend(engine.transaction_tables(best));
            }
        }
        debug!(tables = tables.len(), "transaction tables collected");
        tables
    }
}

/// A strategy's extracted statement, before categorization
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub method: ExtractionMethod,
    pub confidence: f64,
    pub metadata: StatementMetadata,
    pub transactions: Vec<Transaction>,
    pub installments: Vec<InstallmentPlan>,
    pub warnings: Vec<String>,
}

impl Candidate {
    pub fn from_parsed(method: ExtractionMethod, parsed: &ParsedStatement) -> Self {
        Self {
            method,
            confidence: parsed.confidence(),
            metadata: parsed.metadata(),
            transactions: parsed.transactions.value.clone(),
            installments: parsed.installments.clone(),
            warnings: parsed.validation.warnings.clone(),
        }
    }

    /// Enough confidence and a plausible number of movements.
    pub fn meets(&self, threshold: f64) -> bool {
        let count = self.transactions.len();
        count > 0 && count <= MAX_TRANSACTIONS && self.confidence >= threshold
    }

    pub fn into_result(self, success: bool, raw_text: String, error: Option<String>) -> ExtractionResult {
        ExtractionResult {
            success,
            confidence: self.confidence.clamp(0.0, 1.0),
            method: self.method,
            metadata: self.metadata,
            transactions: self.transactions,
            installments: self.installments,
            raw_text,
            error,
            warnings: self.warnings,
            page_reports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Accepted(Candidate),
    Rejected {
        partial: Option<Candidate>,
        reason: String,
    },
    Skipped(String),
}

impl StrategyOutcome {
    fn judge(candidate: Candidate, threshold: f64) -> Self {
        if candidate.meets(threshold) {
            return StrategyOutcome::Accepted(candidate);
        }
        let reason = if candidate.transactions.is_empty() {
            "no transactions found".to_string()
        } else if candidate.transactions.len() > MAX_TRANSACTIONS {
            format!("unusually high transaction count: {}", candidate.transactions.len())
        } else {
            format!("confidence {:.2} below {threshold:.2}", candidate.confidence)
        };
        StrategyOutcome::Rejected {
            partial: Some(candidate),
            reason,
        }
    }
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Method recorded on results this strategy produces
    fn method(&self) -> ExtractionMethod;

    async fn attempt(&self, ctx: &mut ExtractionContext) -> StrategyOutcome;
}

/// Regex template over the text layer, for documents classified as CONDUSEF
pub struct TemplateStrategy {
    parser: Arc<TemplateParser>,
    threshold: f64,
}

impl TemplateStrategy {
    pub fn new(parser: Arc<TemplateParser>, threshold: f64) -> Self {
        Self { parser, threshold }
    }
}

#[async_trait]
impl ExtractionStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Template
    }

    async fn attempt(&self, ctx: &mut ExtractionContext) -> StrategyOutcome {
        if !ctx.classification().is_condusef() {
            return StrategyOutcome::Skipped("document not classified as a CONDUSEF statement".to_string());
        }
        let parsed = ctx.template(&self.parser);
        StrategyOutcome::judge(Candidate::from_parsed(ExtractionMethod::Template, parsed), self.threshold)
    }
}

/// Tables from the engine (OCR included), re-read by the template and,
/// failing that, cell by cell. For CONDUSEF documents, header fields missing
/// from the tables are taken from the template parse of the full text.
pub struct TableStrategy {
    engine: Arc<TableExtractionEngine>,
    parser: Arc<TemplateParser>,
    threshold: f64,
}

impl TableStrategy {
    pub fn new(engine: Arc<TableExtractionEngine>, parser: Arc<TemplateParser>, threshold: f64) -> Self {
        Self {
            engine,
            parser,
            threshold,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for TableStrategy {
    fn name(&self) -> &'static str {
        "tables"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::OcrTable
    }

    async fn attempt(&self, ctx: &mut ExtractionContext) -> StrategyOutcome {
        let tables = ctx.transaction_tables(&self.engine).await;
        if tables.is_empty() {
            return StrategyOutcome::Rejected {
                partial: None,
                reason: "no transaction tables found".to_string(),
            };
        }

        let reparsed = self.parser.parse(&render_tables_as_text(&tables), ctx.filename());
        let mut metadata = reparsed.metadata();
        // unclassified text never goes through the template
        if ctx.classification().is_condusef() {
            let base = ctx.template(&self.parser).metadata();
            metadata.fill_missing(&base);
        }

        let (transactions, txn_confidence) = if reparsed.transactions.value.is_empty() {
            let context = metadata.period_end.or(metadata.cut_date);
            let rows = TableRowParser::new(context).parse(&tables);
            debug!(rows = rows.value.len(), confidence = rows.confidence, "table rows parsed cell by cell");
            rows.into_parts()
        } else {
            reparsed.transactions.clone().into_parts()
        };

        let confidence = mean(&[
            ratio(metadata.payment_fields_found(), 6),
            ratio(metadata.balance_fields_found(), 6),
            txn_confidence,
        ]);
        let candidate = Candidate {
            method: ExtractionMethod::OcrTable,
            confidence,
            metadata,
            transactions,
            installments: reparsed.installments,
            warnings: Vec::new(),
        };
        StrategyOutcome::judge(candidate, self.threshold)
    }
}

/// Whole-statement extraction by the language model
pub struct LlmFallbackStrategy {
    extractor: Option<LlmStatementExtractor>,
    threshold: f64,
}

impl LlmFallbackStrategy {
    pub fn new(extractor: Option<LlmStatementExtractor>, threshold: f64) -> Self {
        Self { extractor, threshold }
    }
}

#[async_trait]
impl ExtractionStrategy for LlmFallbackStrategy {
    fn name(&self) -> &'static str {
        "llm_fallback"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::LlmFallback
    }

    async fn attempt(&self, ctx: &mut ExtractionContext) -> StrategyOutcome {
        let Some(extractor) = self.extractor.as_ref().filter(|e| e.is_available()) else {
            return StrategyOutcome::Rejected {
                partial: None,
                reason: "language model not available".to_string(),
            };
        };
        match extractor.extract(ctx.raw_text()).await {
            Ok(scored) => {
                let (statement, confidence) = scored.into_parts();
                let mut warnings = Vec::new();
                if statement.dropped_rows > 0 {
                    warnings.push(format!(
                        "{} row(s) from the language model were dropped",
                        statement.dropped_rows
                    ));
                }
                let candidate = Candidate {
                    method: ExtractionMethod::LlmFallback,
                    confidence,
                    metadata: statement.metadata,
                    transactions: statement.transactions,
                    installments: Vec::new(),
                    warnings,
                };
                StrategyOutcome::judge(candidate, self.threshold)
            }
            Err(e) => {
                warn!(error = %e, "language model extraction failed");
                StrategyOutcome::Rejected {
                    partial: None,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candidate(confidence: f64, count: usize) -> Candidate {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        Candidate {
            method: ExtractionMethod::Template,
            confidence,
            metadata: StatementMetadata::default(),
            transactions: (0..count).map(|_| Transaction::new(date, None, "OXXO", -1.0)).collect(),
            installments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_acceptance() {
        assert!(matches!(StrategyOutcome::judge(candidate(0.6, 3), 0.6), StrategyOutcome::Accepted(_)));
        match StrategyOutcome::judge(candidate(0.59, 3), 0.6) {
            StrategyOutcome::Rejected { partial, reason } => {
                assert!(partial.is_some());
                assert!(reason.contains("below"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            StrategyOutcome::judge(candidate(0.9, 0), 0.6),
            StrategyOutcome::Rejected { .. }
        ));
        assert!(matches!(
            StrategyOutcome::judge(candidate(0.9, MAX_TRANSACTIONS + 1), 0.6),
            StrategyOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_into_result() {
        let r = candidate(0.8, 2).into_result(true, "texto".into(), None);
        assert!(r.success);
        assert_eq!(r.method, ExtractionMethod::Template);
        assert_eq!(r.raw_text, "texto");
        assert_eq!(r.transactions.len(), 2);
    }
}
