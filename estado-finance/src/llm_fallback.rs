//! Last-resort extraction: ask the language model for the whole statement
//! as JSON and keep only what parses.

use std::sync::Arc;

use chrono::NaiveDate;
use estado_core::{Scored, StatementMetadata, Transaction, mean, parse_amount, parse_statement_date, ratio};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::categorizer::first_json_object;
use crate::llm::{LanguageModel, LlmError, RetryPolicy, complete_with_retry};

/// Ceiling for anything the model extracts
pub const CONFIDENCE_CAP: f64 = 0.6;
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 24_000;

const SYSTEM_PROMPT: &str = "You extract data from Mexican credit card statements (CONDUSEF format). \
Answer with one JSON object and nothing else, shaped as:\n\
{\"metadata\": {\"bank_name\": str|null, \"customer_name\": str|null, \"card_last_four\": str|null, \
\"rfc\": str|null, \"period_start\": \"YYYY-MM-DD\"|null, \"period_end\": \"YYYY-MM-DD\"|null, \
\"cut_date\": \"YYYY-MM-DD\"|null, \"due_date\": \"YYYY-MM-DD\"|null, \"pay_no_interest\": number|null, \
\"minimum_payment\": number|null, \"previous_balance\": number|null, \"total_charges\": number|null, \
\"total_payments\": number|null, \"credit_limit\": number|null, \"available_credit\": number|null, \
\"total_balance\": number|null},\n\
\"transactions\": [{\"operation_date\": \"YYYY-MM-DD\", \"charge_date\": \"YYYY-MM-DD\"|null, \
\"description\": str, \"amount\": number, \"type\": \"charge\"|\"payment\"}]}\n\
Charges are negative amounts, payments and credits positive. Use null for anything not printed.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStatement {
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawMetadata {
    bank_name: Option<String>,
    customer_name: Option<String>,
    card_last_four: Option<String>,
    rfc: Option<String>,
    period_start: Option<String>,
    period_end: Option<String>,
    cut_date: Option<String>,
    due_date: Option<String>,
    pay_no_interest: Option<f64>,
    minimum_payment: Option<f64>,
    previous_balance: Option<f64>,
    total_charges: Option<f64>,
    total_payments: Option<f64>,
    credit_limit: Option<f64>,
    available_credit: Option<f64>,
    total_balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransaction {
    operation_date: String,
    #[serde(default)]
    charge_date: Option<String>,
    description: String,
    amount: Value,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// What survived validation of the model's answer
#[derive(Debug, Clone, PartialEq)]
pub struct LlmStatement {
    pub metadata: StatementMetadata,
    pub transactions: Vec<Transaction>,
    /// Rows dropped for an unreadable date, amount or description
    pub dropped_rows: usize,
}

pub struct LlmStatementExtractor {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    max_prompt_chars: usize,
}

impl LlmStatementExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }

    pub fn is_available(&self) -> bool {
        self.model.is_available()
    }

    pub async fn extract(&self, text: &str) -> Result<Scored<LlmStatement>, LlmError> {
        let excerpt: String = text.chars().take(self.max_prompt_chars).collect();
        let user = format!("Statement text:\n{excerpt}");
        let answer = complete_with_retry(self.model.as_ref(), SYSTEM_PROMPT, &user, &self.retry).await?;
        let scored = parse_statement_response(&answer)?;
        info!(
            transactions = scored.value.transactions.len(),
            dropped = scored.value.dropped_rows,
            confidence = scored.confidence,
            "language model extraction parsed"
        );
        Ok(scored)
    }
}

/// Strictly parse the model's JSON statement, scored like the template
/// parser and capped at [`CONFIDENCE_CAP`].
pub fn parse_statement_response(text: &str) -> Result<Scored<LlmStatement>, LlmError> {
    let block = first_json_object(text).ok_or_else(|| LlmError::Malformed("no JSON object in response".to_string()))?;
    let raw: RawStatement = serde_json::from_str(block).map_err(|e| LlmError::Malformed(e.to_string()))?;

    let metadata = convert_metadata(raw.metadata);
    let context = metadata.period_end.or(metadata.cut_date);

    let total_rows = raw.transactions.len();
    let transactions: Vec<Transaction> = raw
        .transactions
        .into_iter()
        .filter_map(|row| convert_row(row, context))
        .collect();
    let dropped_rows = total_rows - transactions.len();

    let confidence = mean(&[
        ratio(metadata.payment_fields_found(), 6),
        ratio(metadata.balance_fields_found(), 6),
        ratio(transactions.len(), total_rows),
    ]);

    Ok(Scored::new(
        LlmStatement {
            metadata,
            transactions,
            dropped_rows,
        },
        confidence,
    )
    .capped(CONFIDENCE_CAP))
}

fn convert_metadata(raw: RawMetadata) -> StatementMetadata {
    let period_end = date(raw.period_end.as_deref(), None);
    let context = period_end.or(date(raw.cut_date.as_deref(), None));
    StatementMetadata {
        bank_name: non_empty(raw.bank_name),
        customer_name: non_empty(raw.customer_name),
        card_last_four: raw.card_last_four.as_deref().and_then(last_four),
        rfc: non_empty(raw.rfc).map(|r| r.to_uppercase()),
        period_start: date(raw.period_start.as_deref(), context),
        period_end,
        cut_date: date(raw.cut_date.as_deref(), context),
        due_date: date(raw.due_date.as_deref(), context),
        pay_no_interest: raw.pay_no_interest.filter(|v| v.is_finite()),
        minimum_payment: raw.minimum_payment.filter(|v| v.is_finite()),
        previous_balance: raw.previous_balance.filter(|v| v.is_finite()),
        total_charges: raw.total_charges.filter(|v| v.is_finite()),
        total_payments: raw.total_payments.filter(|v| v.is_finite()),
        credit_limit: raw.credit_limit.filter(|v| v.is_finite()),
        available_credit: raw.available_credit.filter(|v| v.is_finite()),
        total_balance: raw.total_balance.filter(|v| v.is_finite()),
    }
}

fn convert_row(row: RawTransaction, context: Option<NaiveDate>) -> Option<Transaction> {
    let Some(operation_date) = date(Some(row.operation_date.as_str()), context) else {
        debug!(date = %row.operation_date, "dropping row with unreadable date");
        return None;
    };
    let amount = match &row.amount {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
    .filter(|a| a.is_finite());
    let Some(mut amount) = amount else {
        debug!(amount = %row.amount, "dropping row with unreadable amount");
        return None;
    };
    let description = row.description.trim();
    if description.is_empty() {
        return None;
    }

    // An explicit type decides the sign
    match row.kind.as_deref().map(str::trim) {
        Some(k) if k.eq_ignore_ascii_case("charge") => amount = -amount.abs(),
        Some(k) if k.eq_ignore_ascii_case("payment") => amount = amount.abs(),
        _ => {}
    }

    let charge_date = date(row.charge_date.as_deref(), context);
    Some(Transaction::new(operation_date, charge_date, description, amount))
}

fn date(raw: Option<&str>, context: Option<NaiveDate>) -> Option<NaiveDate> {
    parse_statement_date(raw?.trim(), context)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn last_four(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 4).then(|| digits[digits.len() - 4..].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use estado_core::TransactionType;

    const ANSWER: &str = r#"Claro, aquí está:
{"metadata": {"bank_name": "BBVA", "card_last_four": "**** 9876", "period_start": "2023-01-01",
  "period_end": "2023-01-31", "cut_date": "2023-01-31", "due_date": "2023-02-20",
  "pay_no_interest": 5432.10, "minimum_payment": 350.0, "previous_balance": 1000.0,
  "total_charges": 655.8, "total_payments": 2000.0, "credit_limit": 50000.0,
  "available_credit": 44567.9, "total_balance": 5432.1},
 "transactions": [
  {"operation_date": "2023-01-15", "description": "OXXO MONTERREY", "amount": 55.80, "type": "charge"},
  {"operation_date": "2023-01-20", "description": "SU PAGO GRACIAS", "amount": "2,000.00", "type": "payment"},
  {"operation_date": "ayer", "description": "PEMEX", "amount": -600.0},
  {"operation_date": "2023-01-22", "description": "LIVERPOOL", "amount": "mucho"}
 ]}"#;

    #[test]
    fn test_parse_keeps_valid_rows_and_caps_confidence() {
        let scored = parse_statement_response(ANSWER).unwrap();
        let s = &scored.value;
        assert_eq!(s.metadata.card_last_four.as_deref(), Some("9876"));
        assert_eq!(s.metadata.payment_fields_found(), 6);
        assert_eq!(s.transactions.len(), 2);
        assert_eq!(s.dropped_rows, 2);

        assert_eq!(s.transactions[0].amount, -55.80);
        assert_eq!(s.transactions[0].kind, TransactionType::Charge);
        assert_eq!(s.transactions[1].amount, 2000.0);
        assert!(s.transactions.iter().all(|t| t.sign_consistent()));

        // (1 + 1 + 0.5) / 3 is above the cap
        assert_eq!(scored.confidence, CONFIDENCE_CAP);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_statement_response(r#"{"metadata": {}, "transactions": [], "notes": "x"}"#).unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
        assert!(parse_statement_response("no lo sé").is_err());
    }

    #[test]
    fn test_empty_answer_scores_zero() {
        let scored = parse_statement_response(r#"{"transactions": []}"#).unwrap();
        assert!(scored.value.transactions.is_empty());
        assert_eq!(scored.confidence, 0.0);
    }
}
