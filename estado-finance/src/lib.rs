//! estado-finance: transaction categorization, language-model access, the
//! extraction pipeline and its evaluation

pub mod cache;
pub mod categorizer;
pub mod category_rules;
pub mod evaluation;
pub mod export;
pub mod llm;
pub mod llm_fallback;
pub mod pipeline;
pub mod strategy;

pub use cache::{CachedCategory, CategoryCache, MemoryCategoryCache};
pub use categorizer::{Assignment, CategorizationSummary, TransactionCategorizer};
pub use category_rules::{CategoryRules, RuleMatch, normalize_description};
pub use evaluation::{EvaluationReport, ExpectedStatement, ExpectedTransaction, evaluate};
pub use export::{export_csv, write_transactions_csv};
pub use llm::{HttpLanguageModel, LanguageModel, LlmError, Provider, RetryPolicy, complete_with_retry};
pub use llm_fallback::{LlmStatement, LlmStatementExtractor};
pub use pipeline::{PipelineBuilder, PipelineConfig, PipelineError, StatementPipeline};
pub use strategy::{Candidate, ExtractionContext, ExtractionStrategy, StrategyOutcome};
