//! Statement record types produced by the extraction pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which strategy produced an [`ExtractionResult`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    #[serde(rename = "template")]
    Template,
    #[serde(rename = "ocr_table")]
    OcrTable,
    #[serde(rename = "llm_fallback")]
    LlmFallback,
    #[serde(rename = "text_extraction_failed")]
    TextExtractionFailed,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Template => "template",
            ExtractionMethod::OcrTable => "ocr_table",
            ExtractionMethod::LlmFallback => "llm_fallback",
            ExtractionMethod::TextExtractionFailed => "text_extraction_failed",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of money movement on the card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    #[serde(rename = "charge")]
    Charge,
    #[serde(rename = "payment")]
    Payment,
}

impl TransactionType {
    /// Negative amounts are charges; zero and positive amounts are payments.
    pub fn for_amount(amount: f64) -> Self {
        if amount < 0.0 {
            TransactionType::Charge
        } else {
            TransactionType::Payment
        }
    }
}

/// Spending categories. Serialized with the Spanish values used in reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[serde(rename = "alimentacion")]
    Food,
    #[serde(rename = "gasolineras")]
    GasStations,
    #[serde(rename = "salud")]
    Health,
    #[serde(rename = "transporte")]
    Transport,
    #[serde(rename = "entretenimiento")]
    Entertainment,
    #[serde(rename = "ropa")]
    Clothing,
    #[serde(rename = "servicios")]
    Services,
    #[serde(rename = "educacion")]
    Education,
    #[serde(rename = "seguros")]
    Insurance,
    #[serde(rename = "transferencias")]
    Transfers,
    #[serde(rename = "intereses_comisiones")]
    InterestFees,
    #[serde(rename = "otros")]
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Food,
        Category::GasStations,
        Category::Health,
        Category::Transport,
        Category::Entertainment,
        Category::Clothing,
        Category::Services,
        Category::Education,
        Category::Insurance,
        Category::Transfers,
        Category::InterestFees,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "alimentacion",
            Category::GasStations => "gasolineras",
            Category::Health => "salud",
            Category::Transport => "transporte",
            Category::Entertainment => "entretenimiento",
            Category::Clothing => "ropa",
            Category::Services => "servicios",
            Category::Education => "educacion",
            Category::Insurance => "seguros",
            Category::Transfers => "transferencias",
            Category::InterestFees => "intereses_comisiones",
            Category::Other => "otros",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts only the serialized values (case and surrounding whitespace ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// How a transaction's category was decided
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMethod {
    ExactMatch,
    PatternMatch,
    ContainsMatch,
    Llm,
    Cache,
    #[default]
    Default,
}

impl CategorizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorizationMethod::ExactMatch => "exact_match",
            CategorizationMethod::PatternMatch => "pattern_match",
            CategorizationMethod::ContainsMatch => "contains_match",
            CategorizationMethod::Llm => "llm",
            CategorizationMethod::Cache => "cache",
            CategorizationMethod::Default => "default",
        }
    }
}

/// One line item from the statement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Date the purchase or payment happened
    pub operation_date: NaiveDate,
    /// Date the bank posted it, when printed separately
    pub charge_date: Option<NaiveDate>,
    pub description: String,
    /// Negative = charge, positive = payment
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: Category,
    /// First category assigned by the categorizer
    pub original_category: Option<Category>,
    /// Manual correction, wins over `category`
    pub override_category: Option<Category>,
    pub categorization_confidence: f64,
    pub categorization_method: CategorizationMethod,
    /// Subscription or other charge that comes back every period
    #[serde(default)]
    pub is_recurring: bool,
}

impl Transaction {
    /// Build an uncategorized transaction. The type is derived from the sign of `amount`.
    pub fn new(
        operation_date: NaiveDate,
        charge_date: Option<NaiveDate>,
        description: impl Into<String>,
        amount: f64,
    ) -> Self {
        // -0.0 would serialize as a negative payment
        let amount = if amount == 0.0 { 0.0 } else { amount };
        Self {
            operation_date,
            charge_date,
            description: description.into(),
            amount,
            kind: TransactionType::for_amount(amount),
            category: Category::Other,
            original_category: None,
            override_category: None,
            categorization_confidence: 0.0,
            categorization_method: CategorizationMethod::Default,
            is_recurring: false,
        }
    }

    pub fn is_charge(&self) -> bool {
        self.kind == TransactionType::Charge
    }

    /// True when the stored type agrees with the sign of the amount.
    pub fn sign_consistent(&self) -> bool {
        (self.amount < 0.0) == (self.kind == TransactionType::Charge)
    }

    /// Record an automatic categorization. The first one is kept as `original_category`.
    pub fn set_category(
        &mut self,
        category: Category,
        method: CategorizationMethod,
        confidence: f64,
    ) {
        if self.original_category.is_none() {
            self.original_category = Some(category);
        }
        self.category = category;
        self.categorization_method = method;
        self.categorization_confidence = confidence.clamp(0.0, 1.0);
    }

    pub fn apply_override(&mut self, category: Category) {
        self.override_category = Some(category);
    }

    pub fn effective_category(&self) -> Category {
        self.override_category.unwrap_or(self.category)
    }
}

/// A purchase financed in monthly payments ("meses sin intereses" and similar)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallmentPlan {
    pub operation_date: Option<NaiveDate>,
    pub description: String,
    pub original_amount: f64,
    pub pending_balance: f64,
    pub required_payment: f64,
    /// Current payment number, the `n` in "n DE m"
    pub payment_number: u32,
    pub total_payments: u32,
    pub interest_bearing: bool,
}

/// Header data of a statement. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatementMetadata {
    pub bank_name: Option<String>,
    pub customer_name: Option<String>,
    /// Last four digits of the card, the only card identifier kept
    pub card_last_four: Option<String>,
    pub rfc: Option<String>,

    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub cut_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub pay_no_interest: Option<f64>,
    pub minimum_payment: Option<f64>,

    pub previous_balance: Option<f64>,
    pub total_charges: Option<f64>,
    pub total_payments: Option<f64>,
    pub credit_limit: Option<f64>,
    pub available_credit: Option<f64>,
    pub total_balance: Option<f64>,
}

impl StatementMetadata {
    pub fn payment_fields_found(&self) -> usize {
        [
            self.period_start.is_some(),
            self.period_end.is_some(),
            self.cut_date.is_some(),
            self.due_date.is_some(),
            self.pay_no_interest.is_some(),
            self.minimum_payment.is_some(),
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }

    pub fn balance_fields_found(&self) -> usize {
        [
            self.previous_balance,
            self.total_charges,
            self.total_payments,
            self.credit_limit,
            self.available_credit,
            self.total_balance,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }

    /// Fill fields that are `None` here from `other`.
    pub fn fill_missing(&mut self, other: &StatementMetadata) {
        fn take<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        take(&mut self.bank_name, &other.bank_name);
        take(&mut self.customer_name, &other.customer_name);
        take(&mut self.card_last_four, &other.card_last_four);
        take(&mut self.rfc, &other.rfc);
        take(&mut self.period_start, &other.period_start);
        take(&mut self.period_end, &other.period_end);
        take(&mut self.cut_date, &other.cut_date);
        take(&mut self.due_date, &other.due_date);
        take(&mut self.pay_no_interest, &other.pay_no_interest);
        take(&mut self.minimum_payment, &other.minimum_payment);
        take(&mut self.previous_balance, &other.previous_balance);
        take(&mut self.total_charges, &other.total_charges);
        take(&mut self.total_payments, &other.total_payments);
        take(&mut self.credit_limit, &other.credit_limit);
        take(&mut self.available_credit, &other.available_credit);
        take(&mut self.total_balance, &other.total_balance);
    }
}

/// Where a page's text came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageTextSource {
    TextLayer,
    Tables,
    Ocr,
    None,
}

/// Per-page audit entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageReport {
    /// 1-based page number
    pub page: usize,
    pub source: PageTextSource,
    pub chars: usize,
    pub error: Option<String>,
}

/// Final envelope returned for every processed document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub confidence: f64,
    pub method: ExtractionMethod,
    pub metadata: StatementMetadata,
    pub transactions: Vec<Transaction>,
    pub installments: Vec<InstallmentPlan>,
    /// Full extracted text, kept for audit even on failure
    pub raw_text: String,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub page_reports: Vec<PageReport>,
}

impl ExtractionResult {
    /// An unsuccessful result carrying whatever text was captured.
    pub fn failed(method: ExtractionMethod, raw_text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            confidence: 0.0,
            method,
            metadata: StatementMetadata::default(),
            transactions: Vec::new(),
            installments: Vec::new(),
            raw_text: raw_text.into(),
            error: Some(error.into()),
            warnings: Vec::new(),
            page_reports: Vec::new(),
        }
    }

    pub fn text_extraction_failed(error: impl Into<String>) -> Self {
        Self::failed(ExtractionMethod::TextExtractionFailed, String::new(), error)
    }

    /// Sum of charges as a positive number.
    pub fn charges_total(&self) -> f64 {
        self.transactions
            .iter()
            .filter(|t| t.is_charge())
            .map(|t| -t.amount)
            .sum()
    }

    pub fn payments_total(&self) -> f64 {
        self.transactions
            .iter()
            .filter(|t| !t.is_charge())
            .map(|t| t.amount)
            .sum()
    }

    /// Re-derive the type of any transaction whose sign disagrees with it.
    /// Returns how many were corrected.
    pub fn enforce_sign_convention(&mut self) -> usize {
        let mut fixed = 0;
        for txn in &mut self.transactions {
            if !txn.sign_consistent() {
                txn.kind = TransactionType::for_amount(txn.amount);
                fixed += 1;
            }
        }
        if fixed > 0 {
            self.warnings
                .push(format!("{fixed} transaction(s) had a type that disagreed with the amount sign"));
        }
        fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_type_follows_sign() {
        let charge = Transaction::new(date(2023, 1, 15), None, "OXXO", -55.80);
        assert_eq!(charge.kind, TransactionType::Charge);
        assert!(charge.sign_consistent());

        let payment = Transaction::new(date(2023, 1, 20), None, "PAGO", 2000.0);
        assert_eq!(payment.kind, TransactionType::Payment);

        let zero = Transaction::new(date(2023, 1, 20), None, "AJUSTE", -0.0);
        assert_eq!(zero.kind, TransactionType::Payment);
        assert!(zero.amount.is_sign_positive());
    }

    #[test]
    fn test_default_category_is_otros() {
        let t = Transaction::new(date(2023, 1, 15), None, "???", -1.0);
        assert_eq!(t.category, Category::Other);
        assert_eq!(t.categorization_method, CategorizationMethod::Default);
        assert_eq!(serde_json::to_value(t.category).unwrap(), "otros");
    }

    #[test]
    fn test_override_wins() {
        let mut t = Transaction::new(date(2023, 1, 15), None, "OXXO", -55.8);
        t.set_category(Category::Food, CategorizationMethod::ExactMatch, 0.95);
        t.set_category(Category::Services, CategorizationMethod::Llm, 0.6);
        assert_eq!(t.original_category, Some(Category::Food));
        assert_eq!(t.effective_category(), Category::Services);
        t.apply_override(Category::Health);
        assert_eq!(t.effective_category(), Category::Health);
    }

    #[test]
    fn test_category_parse_is_strict() {
        assert_eq!(" Alimentacion ".parse::<Category>(), Ok(Category::Food));
        assert_eq!("intereses_comisiones".parse::<Category>(), Ok(Category::InterestFees));
        assert!("comida".parse::<Category>().is_err());
        assert!("alimentación".parse::<Category>().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let mut t = Transaction::new(date(2023, 1, 15), None, "OXXO MONTERREY", -55.80);
        t.set_category(Category::Food, CategorizationMethod::ExactMatch, 0.95);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["type"], "charge");
        assert_eq!(v["category"], "alimentacion");
        assert_eq!(v["categorization_method"], "exact_match");
        assert_eq!(v["operation_date"], "2023-01-15");
        assert_eq!(v["is_recurring"], false);
    }

    #[test]
    fn test_field_counts_and_fill() {
        let mut m = StatementMetadata {
            period_end: Some(date(2023, 1, 31)),
            cut_date: Some(date(2023, 1, 31)),
            total_balance: Some(10.0),
            ..Default::default()
        };
        assert_eq!(m.payment_fields_found(), 2);
        assert_eq!(m.balance_fields_found(), 1);

        let other = StatementMetadata {
            card_last_four: Some("1234".into()),
            total_balance: Some(99.0),
            ..Default::default()
        };
        m.fill_missing(&other);
        assert_eq!(m.card_last_four.as_deref(), Some("1234"));
        assert_eq!(m.total_balance, Some(10.0));
    }

    #[test]
    fn test_enforce_sign_convention() {
        let mut r = ExtractionResult::failed(ExtractionMethod::Template, "", "x");
        let mut t = Transaction::new(date(2023, 1, 15), None, "OXXO", -10.0);
        t.kind = TransactionType::Payment;
        r.transactions.push(t);
        assert_eq!(r.enforce_sign_convention(), 1);
        assert!(r.transactions[0].is_charge());
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.charges_total(), 10.0);
    }
}
