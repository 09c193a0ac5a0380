//! Transaction categorization: deterministic rules first, then one batched
//! language-model request per chunk of distinct unmatched descriptions.

use std::collections::HashMap;
use std::sync::Arc;

use estado_core::{CategorizationMethod, Category, Transaction};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CachedCategory, CategoryCache, MemoryCategoryCache};
use crate::category_rules::{CategoryRules, normalize_description};
use crate::llm::{LanguageModel, LlmError, RetryPolicy, complete_with_retry};

/// Distinct descriptions sent in one model request
pub const DEFAULT_BATCH_SIZE: usize = 40;
pub const LLM_CONFIDENCE: f64 = 0.60;

/// The category decided for one description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub category: Category,
    pub method: CategorizationMethod,
    pub confidence: f64,
}

impl Assignment {
    fn fallback() -> Self {
        Self {
            category: Category::Other,
            method: CategorizationMethod::Default,
            confidence: 0.0,
        }
    }

    fn from_cache(cached: CachedCategory) -> Self {
        Self {
            category: cached.category,
            method: CategorizationMethod::Cache,
            confidence: cached.confidence,
        }
    }
}

/// Counts per tier for one categorization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorizationSummary {
    pub rules: usize,
    pub cached: usize,
    pub llm: usize,
    pub defaulted: usize,
    pub model_calls: usize,
}

pub struct TransactionCategorizer {
    rules: Arc<CategoryRules>,
    cache: Arc<dyn CategoryCache>,
    model: Option<Arc<dyn LanguageModel>>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl TransactionCategorizer {
    /// Rules only, with a private in-memory cache.
    pub fn new(rules: Arc<CategoryRules>) -> Self {
        Self {
            rules,
            cache: Arc::new(MemoryCategoryCache::new()),
            model: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CategoryCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CategoryCache> {
        &self.cache
    }

    /// Categorize transactions in place.
    pub async fn categorize(&self, transactions: &mut [Transaction]) -> CategorizationSummary {
        let descriptions: Vec<&str> = transactions.iter().map(|t| t.description.as_str()).collect();
        let (assignments, summary) = self.assign(&descriptions).await;
        for (txn, a) in transactions.iter_mut().zip(assignments) {
            txn.set_category(a.category, a.method, a.confidence);
            txn.is_recurring = self.rules.is_recurring(&txn.description);
        }
        info!(
            rules = summary.rules,
            cached = summary.cached,
            llm = summary.llm,
            defaulted = summary.defaulted,
            model_calls = summary.model_calls,
            "transactions categorized"
        );
        summary
    }

    /// One assignment per description, in input order.
    pub async fn assign(&self, descriptions: &[&str]) -> (Vec<Assignment>, CategorizationSummary) {
        let mut summary = CategorizationSummary::default();
        let mut out = vec![Assignment::fallback(); descriptions.len()];

        // normalized description -> indices still waiting for a category
        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (i, desc) in descriptions.iter().enumerate() {
            if let Some(m) = self.rules.categorize(desc) {
                out[i] = Assignment {
                    category: m.category,
                    method: m.method,
                    confidence: m.confidence,
                };
                summary.rules += 1;
                continue;
            }
            let key = normalize_description(desc);
            pending
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(i);
        }

        let mut unresolved = Vec::new();
        for key in order {
            match self.cache.get(&key) {
                Some(cached) => {
                    for &i in &pending[&key] {
                        out[i] = Assignment::from_cache(cached);
                        summary.cached += 1;
                    }
                }
                None => unresolved.push(key),
            }
        }

        let model = self.model.as_ref().filter(|m| m.is_available());
        match model {
            Some(model) if !unresolved.is_empty() => {
                for chunk in unresolved.chunks(self.batch_size) {
                    summary.model_calls += 1;
                    let answers = self.ask_model(&**model, chunk).await;
                    for key in chunk {
                        let assignment = match answers.get(key) {
                            Some(category) => {
                                self.cache.insert(
                                    key.clone(),
                                    CachedCategory {
                                        category: *category,
                                        confidence: LLM_CONFIDENCE,
                                        resolved: true,
                                    },
                                );
                                summary.llm += pending[key].len();
                                Assignment {
                                    category: *category,
                                    method: CategorizationMethod::Llm,
                                    confidence: LLM_CONFIDENCE,
                                }
                            }
                            None => {
                                self.cache.insert(
                                    key.clone(),
                                    CachedCategory {
                                        category: Category::Other,
                                        confidence: 0.0,
                                        resolved: false,
                                    },
                                );
                                summary.defaulted += pending[key].len();
                                Assignment::fallback()
                            }
                        };
                        for &i in &pending[key] {
                            out[i] = assignment;
                        }
                    }
                }
            }
            _ => {
                if !unresolved.is_empty() {
                    debug!(descriptions = unresolved.len(), "no language model, leaving as otros");
                }
                summary.defaulted += unresolved.iter().map(|k| pending[k].len()).sum::<usize>();
            }
        }

        (out, summary)
    }

    /// Categories the model gave for `batch`. Descriptions it did not answer,
    /// or answered outside the category list, are absent from the map.
    async fn ask_model(&self, model: &dyn LanguageModel, batch: &[String]) -> HashMap<String, Category> {
        let user = build_user_prompt(batch);
        let text = match complete_with_retry(model, &system_prompt(), &user, &self.retry).await {
            Ok(text) => text,
            Err(e) => {
                warn!(batch = batch.len(), error = %e, "categorization request failed");
                return HashMap::new();
            }
        };
        match parse_category_response(&text, batch) {
            Ok(map) => map,
            Err(e) => {
                warn!(batch = batch.len(), error = %e, "discarding categorization batch");
                HashMap::new()
            }
        }
    }
}

fn system_prompt() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    format!(
        "You categorize transactions from Mexican credit card statements.\n\
         Allowed categories: {}.\n\
         Answer with a single JSON object that maps every description, exactly as given, \
         to one allowed category. Use \"otros\" when unsure. No other text.",
        categories.join(", ")
    )
}

fn build_user_prompt(batch: &[String]) -> String {
    let list = serde_json::to_string(batch).unwrap_or_else(|_| format!("{batch:?}"));
    format!("Descriptions:\n{list}")
}

/// First balanced `{...}` block in `text`, honoring JSON strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a description -> category object. Keys outside `batch` are
/// rejected, values outside the category list become `otros`.
pub fn parse_category_response(text: &str, batch: &[String]) -> Result<HashMap<String, Category>, LlmError> {
    let block = first_json_object(text).ok_or_else(|| LlmError::Malformed("no JSON object in response".to_string()))?;
    let object: serde_json::Map<String, Value> =
        serde_json::from_str(block).map_err(|e| LlmError::Malformed(e.to_string()))?;

    let mut out = HashMap::new();
    for (key, value) in object {
        let key = normalize_description(&key);
        if !batch.contains(&key) {
            warn!(description = key, "model answered a description that was not asked");
            continue;
        }
        let category = value
            .as_str()
            .and_then(|s| s.parse::<Category>().ok())
            .unwrap_or(Category::Other);
        out.insert(key, category);
    }
    Ok(out)
}
