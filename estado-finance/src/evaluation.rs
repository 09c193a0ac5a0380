//! Accuracy of an extraction against a hand-checked expectation.

use chrono::NaiveDate;
use estado_core::{ExtractionResult, StatementMetadata, Transaction, amounts_match, mean};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Amount tolerance when matching fields and transactions
pub const AMOUNT_TOLERANCE: f64 = 0.01;
/// Leading description characters compared when matching transactions
pub const DESCRIPTION_PREFIX: usize = 10;

/// Ground truth for one statement. Only metadata fields that are set are scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedStatement {
    pub metadata: StatementMetadata,
    pub transactions: Vec<ExpectedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedTransaction {
    pub operation_date: NaiveDate,
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub expected: String,
    pub extracted: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionScore {
    pub correct: usize,
    pub total: usize,
    pub mismatches: Vec<FieldMismatch>,
}

impl SectionScore {
    /// Share of expected fields extracted correctly; 1.0 when nothing was expected.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.correct as f64 / self.total as f64
    }

    fn record(&mut self, field: &'static str, ok: bool, expected: String, extracted: Option<String>) {
        self.total += 1;
        if ok {
            self.correct += 1;
        } else {
            debug!(field, expected = %expected, extracted = ?extracted, "field mismatch");
            self.mismatches.push(FieldMismatch {
                field,
                expected,
                extracted,
            });
        }
    }

    fn text(&mut self, field: &'static str, expected: &Option<String>, got: &Option<String>) {
        if let Some(want) = expected {
            let ok = got
                .as_deref()
                .is_some_and(|g| g.trim().eq_ignore_ascii_case(want.trim()));
            self.record(field, ok, want.clone(), got.clone());
        }
    }

    fn date(&mut self, field: &'static str, expected: Option<NaiveDate>, got: Option<NaiveDate>) {
        if let Some(want) = expected {
            self.record(field, got == Some(want), want.to_string(), got.map(|d| d.to_string()));
        }
    }

    fn amount(&mut self, field: &'static str, expected: Option<f64>, got: Option<f64>) {
        if let Some(want) = expected {
            let ok = got.is_some_and(|g| (g - want).abs() <= AMOUNT_TOLERANCE || amounts_match(g, want));
            self.record(field, ok, format!("{want:.2}"), got.map(|g| format!("{g:.2}")));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionScore {
    pub expected: usize,
    pub extracted: usize,
    pub matched: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub customer: SectionScore,
    pub payment: SectionScore,
    pub balance: SectionScore,
    pub transactions: TransactionScore,
    /// Mean of the scored sections' accuracies and the transaction F1
    pub overall: f64,
}

pub fn evaluate(result: &ExtractionResult, expected: &ExpectedStatement) -> EvaluationReport {
    let got = &result.metadata;
    let want = &expected.metadata;

    let mut customer = SectionScore::default();
    customer.text("bank_name", &want.bank_name, &got.bank_name);
    customer.text("customer_name", &want.customer_name, &got.customer_name);
    customer.text("card_last_four", &want.card_last_four, &got.card_last_four);
    customer.text("rfc", &want.rfc, &got.rfc);

    let mut payment = SectionScore::default();
    payment.date("period_start", want.period_start, got.period_start);
    payment.date("period_end", want.period_end, got.period_end);
    payment.date("cut_date", want.cut_date, got.cut_date);
    payment.date("due_date", want.due_date, got.due_date);
    payment.amount("pay_no_interest", want.pay_no_interest, got.pay_no_interest);
    payment.amount("minimum_payment", want.minimum_payment, got.minimum_payment);

    let mut balance = SectionScore::default();
    balance.amount("previous_balance", want.previous_balance, got.previous_balance);
    balance.amount("total_charges", want.total_charges, got.total_charges);
    balance.amount("total_payments", want.total_payments, got.total_payments);
    balance.amount("credit_limit", want.credit_limit, got.credit_limit);
    balance.amount("available_credit", want.available_credit, got.available_credit);
    balance.amount("total_balance", want.total_balance, got.total_balance);

    let transactions = score_transactions(&result.transactions, &expected.transactions);

    let mut scores: Vec<f64> = [&customer, &payment, &balance]
        .iter()
        .filter(|s| s.total > 0)
        .map(|s| s.accuracy())
        .collect();
    if transactions.expected > 0 || transactions.extracted > 0 {
        scores.push(transactions.f1);
    }

    EvaluationReport {
        overall: mean(&scores),
        customer,
        payment,
        balance,
        transactions,
    }
}

/// One-to-one matching on operation date, amount magnitude and the first
/// characters of the description.
pub fn score_transactions(extracted: &[Transaction], expected: &[ExpectedTransaction]) -> TransactionScore {
    let mut used = vec![false; extracted.len()];
    let mut matched = 0;
    for want in expected {
        let hit = extracted
            .iter()
            .enumerate()
            .find(|(i, got)| !used[*i] && transaction_matches(got, want))
            .map(|(i, _)| i);
        if let Some(i) = hit {
            used[i] = true;
            matched += 1;
        }
    }

    let precision = if extracted.is_empty() { 0.0 } else { matched as f64 / extracted.len() as f64 };
    let recall = if expected.is_empty() { 0.0 } else { matched as f64 / expected.len() as f64 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    TransactionScore {
        expected: expected.len(),
        extracted: extracted.len(),
        matched,
        precision,
        recall,
        f1,
    }
}

fn transaction_matches(got: &Transaction, want: &ExpectedTransaction) -> bool {
    got.operation_date == want.operation_date
        && (got.amount.abs() - want.amount.abs()).abs() <= AMOUNT_TOLERANCE
        && description_prefix(&got.description) == description_prefix(&want.description)
}

fn description_prefix(desc: &str) -> String {
    desc.trim().to_lowercase().chars().take(DESCRIPTION_PREFIX).collect()
}
