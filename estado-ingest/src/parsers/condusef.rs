//! Template parser for the CONDUSEF statement layout.
//!
//! Every Mexican credit card statement prints the same labelled fields and
//! the same movement sections, so the header is read with one regex per
//! field and the movements line by line:
//!
//!   TU PAGO REQUERIDO ESTE PERIODO
//!   Periodo: Del 01-ENE-2023 al 31-ENE-2023
//!   Fecha de corte: 31-ENE-2023
//!   ...
//!   DESGLOSE DE MOVIMIENTOS
//!   COMPRAS Y CARGOS DIFERIDOS A MESES SIN INTERESES
//!   10-DIC-2022  LIVERPOOL POLANCO  $6,000.00  $4,000.00  $1,000.00  2 DE 6
//!   CARGOS, ABONOS Y COMPRAS REGULARES (NO A MESES)
//!   15-ENE-2023  OXXO MONTERREY                 $55.80
//!   20-ENE-2023  SU PAGO GRACIAS            - $2,000.00

use chrono::NaiveDate;
use estado_core::{
    InstallmentPlan, Scored, StatementMetadata, Transaction, mean, parse_amount,
    parse_statement_date, ratio,
};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Combined confidence below this marks the parse invalid
pub const MIN_VALID_CONFIDENCE: f64 = 0.6;
/// More movements than this is treated as a misparse
pub const MAX_TRANSACTIONS: usize = 1000;

const PAYMENT_FIELDS: usize = 6;
const BALANCE_FIELDS: usize = 6;

/// Day, month (name or number) and 2- or 4-digit year
const DATE: &str = r"\d{1,2}[-/ ](?:[A-Za-zÁÉÍÓÚáéíóú]{3,4}\.?|\d{1,2})[-/ ]\d{2,4}";
/// Movement dates may omit the year
const SHORT_DATE: &str = r"\d{1,2}[-/ ][A-Za-zÁÉÍÓÚáéíóú]{3,4}\.?(?:[-/ ]\d{2,4})?";
const AMOUNT: &str = r"\$?\s*[\d,]*\d(?:\.\d{1,2})?";
const SIGNED_AMOUNT: &str = r"[+\-]?\s*\(?\s*\$?\s*[+\-]?\s*[\d,]*\d\.\d{2}\)?";

/// Bank display name and the spellings that identify it
const BANKS: &[(&str, &[&str])] = &[
    ("BBVA", &["BBVA", "BANCOMER"]),
    ("Santander", &["SANTANDER"]),
    ("Banamex", &["CITIBANAMEX", "BANAMEX"]),
    ("HSBC", &["HSBC"]),
    ("Banorte", &["BANORTE"]),
    ("Scotiabank", &["SCOTIABANK"]),
    ("Inbursa", &["INBURSA"]),
    ("Banco Azteca", &["BANCO AZTECA"]),
    ("Afirme", &["AFIRME"]),
];

/// All-caps header lines that are not the customer's name
const NAME_STOPWORDS: &[&str] = &[
    "ESTADO DE CUENTA",
    "TARJETA",
    "PAGO",
    "PERIODO",
    "FECHA",
    "DESGLOSE",
    "CARGOS",
    "RESUMEN",
    "SALDO",
    "CREDITO",
    "CRÉDITO",
    "BANCO",
    "MOVIMIENTOS",
];

const REGULAR_HEADERS: &[&str] = &["DESGLOSE DE MOVIMIENTOS", "CARGOS, ABONOS Y COMPRAS REGULARES"];
const NO_INTEREST_HEADER: &str = "DIFERIDOS A MESES SIN INTERESES";
const INTEREST_HEADER: &str = "DIFERIDOS A MESES CON INTERESES";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    pub customer_name: Option<String>,
    pub rfc: Option<String>,
}

/// "Tu pago requerido este periodo" box
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub cut_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub pay_no_interest: Option<f64>,
    pub minimum_payment: Option<f64>,
}

impl PaymentInfo {
    pub fn fields_found(&self) -> usize {
        [
            self.period_start.is_some(),
            self.period_end.is_some(),
            self.cut_date.is_some(),
            self.due_date.is_some(),
            self.pay_no_interest.is_some(),
            self.minimum_payment.is_some(),
        ]
        .into_iter()
        .filter(|f| *f)
        .count()
    }

    /// Reference date for movement dates printed without a year.
    pub fn year_context(&self) -> Option<NaiveDate> {
        self.period_end.or(self.cut_date)
    }
}

/// "Resumen de cargos y abonos del periodo" box
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub previous_balance: Option<f64>,
    pub total_charges: Option<f64>,
    pub total_payments: Option<f64>,
    pub credit_limit: Option<f64>,
    pub available_credit: Option<f64>,
    pub total_balance: Option<f64>,
}

impl BalanceInfo {
    pub fn fields_found(&self) -> usize {
        [
            self.previous_balance,
            self.total_charges,
            self.total_payments,
            self.credit_limit,
            self.available_credit,
            self.total_balance,
        ]
        .into_iter()
        .filter(Option::is_some)
        .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    pub confidence: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Everything the template parser read from one text, with per-section scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub customer: CustomerInfo,
    pub payment: Scored<PaymentInfo>,
    pub balance: Scored<BalanceInfo>,
    pub transactions: Scored<Vec<Transaction>>,
    pub installments: Vec<InstallmentPlan>,
    pub validation: Validation,
}

impl ParsedStatement {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }

    pub fn confidence(&self) -> f64 {
        self.validation.confidence
    }

    pub fn metadata(&self) -> StatementMetadata {
        let p = &self.payment.value;
        let b = &self.balance.value;
        StatementMetadata {
            bank_name: self.customer.bank_name.clone(),
            customer_name: self.customer.customer_name.clone(),
            card_last_four: self.customer.card_last_four.clone(),
            rfc: self.customer.rfc.clone(),
            period_start: p.period_start,
            period_end: p.period_end,
            cut_date: p.cut_date,
            due_date: p.due_date,
            pay_no_interest: p.pay_no_interest,
            minimum_payment: p.minimum_payment,
            previous_balance: b.previous_balance,
            total_charges: b.total_charges,
            total_payments: b.total_payments,
            credit_limit: b.credit_limit,
            available_credit: b.available_credit,
            total_balance: b.total_balance,
        }
    }
}

/// Movements and installment plans from the transaction sections
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSection {
    pub transactions: Scored<Vec<Transaction>>,
    pub installments: Vec<InstallmentPlan>,
    /// Lines the movement regex matched, parsed or not
    pub matched_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Regular,
    Installments { interest_bearing: bool },
}

pub struct TemplateParser {
    card_labelled: Regex,
    card_bare: Regex,
    rfc: Regex,
    name_line: Regex,
    period: Regex,
    period_start: Regex,
    cut_date: Regex,
    due_date: Regex,
    pay_no_interest: Regex,
    minimum_payment: Regex,
    previous_balance: Regex,
    total_charges: Regex,
    total_payments: Regex,
    credit_limit: Regex,
    available_credit: Regex,
    total_balance: Regex,
    movement: Regex,
    installment: Regex,
}

impl TemplateParser {
    pub fn new() -> Result<Self, regex::Error> {
        let ci = |pattern: String| Regex::new(&format!("(?i){pattern}"));
        Ok(Self {
            card_labelled: ci(r"n[uú]?mero de tarjeta[\s:]*(\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4})".into())?,
            card_bare: Regex::new(r"\b(\d{4}[ -]\d{4}[ -]\d{4}[ -]\d{4})\b")?,
            rfc: ci(r"\bRFC:?\s*([A-Z&Ñ]{3,4}\d{6}[A-Z\d]{3})\b".into())?,
            name_line: Regex::new(r"^[A-ZÁÉÍÓÚÑ ]{10,50}$")?,
            period: ci(format!(r"Periodo:?\s*(?:del\s+)?({DATE})\s+al\s+({DATE})"))?,
            period_start: ci(format!(r"Periodo:?\s*(?:del\s+)?({DATE})"))?,
            cut_date: ci(format!(r"Fecha de corte:?\s*({DATE})"))?,
            due_date: ci(format!(r"Fecha l[íi]mite de pago:?\s*({DATE})"))?,
            pay_no_interest: ci(format!(r"Pago para no generar intereses:?\s*({AMOUNT})"))?,
            minimum_payment: ci(format!(r"Pago m[íi]nimo:?\s*({AMOUNT})"))?,
            previous_balance: ci(format!(r"Adeudo del periodo anterior\s*[=+\-]?\s*:?\s*({AMOUNT})"))?,
            total_charges: ci(format!(r"Cargos regulares[^\n]*?\+\s*({AMOUNT})"))?,
            total_payments: ci(format!(r"Pagos y abonos[^\n]*?-\s*({AMOUNT})"))?,
            credit_limit: ci(format!(r"L[íi]mite de cr[ée]dito:?\s*({AMOUNT})"))?,
            available_credit: ci(format!(r"Cr[ée]dito disponible:?\s*({AMOUNT})"))?,
            total_balance: ci(format!(r"Saldo deudor total:?\s*({AMOUNT})"))?,
            movement: Regex::new(&format!(
                r"^\s*(?P<op>{SHORT_DATE})\s+(?:(?P<charge>{SHORT_DATE})\s+)?(?P<desc>.+?)\s+(?P<amount>{SIGNED_AMOUNT})\s*$"
            ))?,
            installment: ci(format!(
                r"^\s*(?P<op>{SHORT_DATE})\s+(?P<desc>.+?)\s+(?P<original>{AMOUNT})\s+(?P<pending>{AMOUNT})\s+(?P<required>{AMOUNT})\s+(?P<n>\d+)\s*(?:DE|/)\s*(?P<m>\d+)\s*$"
            ))?,
        })
    }

    /// Parse a statement text. `filename` is only a weak hint for the bank.
    pub fn parse(&self, text: &str, filename: Option<&str>) -> ParsedStatement {
        let customer = self.customer_info(text, filename);
        let payment = self.payment_info(text);
        let balance = self.balance_info(text);
        let section = self.transactions(text, payment.value.year_context());
        let validation = validate(
            payment.confidence,
            balance.confidence,
            section.transactions.confidence,
            section.transactions.value.len(),
        );

        info!(
            transactions = section.transactions.value.len(),
            installments = section.installments.len(),
            payment = payment.confidence,
            balance = balance.confidence,
            movements = section.transactions.confidence,
            valid = validation.is_valid,
            "template parse finished"
        );

        ParsedStatement {
            customer,
            payment,
            balance,
            transactions: section.transactions,
            installments: section.installments,
            validation,
        }
    }

    pub fn customer_info(&self, text: &str, filename: Option<&str>) -> CustomerInfo {
        let bank_name = detect_bank(text).or_else(|| filename.and_then(detect_bank));
        let card_last_four = self.find_card_suffix(text).or_else(|| {
            self.card_bare
                .captures(text)
                .and_then(|c| last_four(&c[1]))
        });
        let rfc = self.rfc.captures(text).map(|c| c[1].to_uppercase());

        CustomerInfo {
            bank_name,
            card_last_four,
            customer_name: self.customer_name(text),
            rfc,
        }
    }

    /// Last four digits after a "Número de tarjeta" label.
    pub fn find_card_suffix(&self, text: &str) -> Option<String> {
        self.card_labelled
            .captures(text)
            .and_then(|c| last_four(&c[1]))
    }

    fn customer_name(&self, text: &str) -> Option<String> {
        text.lines()
            .take(20)
            .map(str::trim)
            .filter(|line| self.name_line.is_match(line))
            .filter(|line| line.split_whitespace().count() >= 2)
            .find(|line| {
                !NAME_STOPWORDS.iter().any(|w| line.contains(w))
                    && !BANKS.iter().flat_map(|(_, s)| s.iter()).any(|b| line.contains(b))
            })
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn payment_info(&self, text: &str) -> Scored<PaymentInfo> {
        let date = |re: &Regex| {
            re.captures(text)
                .and_then(|c| parse_statement_date(&c[1], None))
        };

        let (mut period_start, mut period_end) = (None, None);
        if let Some(c) = self.period.captures(text) {
            period_start = parse_statement_date(&c[1], None);
            period_end = parse_statement_date(&c[2], None);
        }
        if period_start.is_none() {
            period_start = date(&self.period_start);
        }

        let info = PaymentInfo {
            period_start,
            period_end,
            cut_date: date(&self.cut_date),
            due_date: date(&self.due_date),
            pay_no_interest: capture_amount(&self.pay_no_interest, text),
            minimum_payment: capture_amount(&self.minimum_payment, text),
        };
        let confidence = ratio(info.fields_found(), PAYMENT_FIELDS);
        debug!(found = info.fields_found(), "payment fields");
        Scored::new(info, confidence)
    }

    pub fn balance_info(&self, text: &str) -> Scored<BalanceInfo> {
        let info = BalanceInfo {
            previous_balance: capture_amount(&self.previous_balance, text),
            total_charges: capture_amount(&self.total_charges, text),
            total_payments: capture_amount(&self.total_payments, text),
            credit_limit: capture_amount(&self.credit_limit, text),
            available_credit: capture_amount(&self.available_credit, text),
            total_balance: capture_amount(&self.total_balance, text),
        };
        let confidence = ratio(info.fields_found(), BALANCE_FIELDS);
        debug!(found = info.fields_found(), "balance fields");
        Scored::new(info, confidence)
    }

    /// Movements under the section headers. Confidence is parsed lines over
    /// matched lines.
    pub fn transactions(&self, text: &str, context: Option<NaiveDate>) -> TransactionSection {
        let mut section = Section::Outside;
        let mut transactions = Vec::new();
        let mut installments = Vec::new();
        let mut matched = 0;

        for line in text.lines() {
            let upper = line.to_uppercase();
            if upper.contains(NO_INTEREST_HEADER) {
                section = Section::Installments { interest_bearing: false };
                continue;
            }
            if upper.contains(INTEREST_HEADER) {
                section = Section::Installments { interest_bearing: true };
                continue;
            }
            if REGULAR_HEADERS.iter().any(|h| upper.contains(h)) {
                section = Section::Regular;
                continue;
            }

            match section {
                Section::Outside => {}
                Section::Regular => {
                    if let Some(caps) = self.movement.captures(line) {
                        matched += 1;
                        match movement_from(&caps, context) {
                            Some(txn) => transactions.push(txn),
                            None => debug!(line = line.trim(), "movement line did not parse"),
                        }
                    }
                }
                Section::Installments { interest_bearing } => {
                    if let Some(caps) = self.installment.captures(line) {
                        match installment_from(&caps, context, interest_bearing) {
                            Some(plan) => installments.push(plan),
                            None => debug!(line = line.trim(), "installment line did not parse"),
                        }
                    }
                }
            }
        }

        if matched == 0 && section == Section::Outside {
            warn!("transaction section not found");
        }
        let confidence = ratio(transactions.len(), matched);
        TransactionSection {
            transactions: Scored::new(transactions, confidence),
            installments,
            matched_lines: matched,
        }
    }
}

/// Mean of the three section scores, failing below the floor or on an
/// implausible movement count.
pub fn validate(payment: f64, balance: f64, transactions: f64, count: usize) -> Validation {
    let confidence = mean(&[payment, balance, transactions]);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if count == 0 {
        errors.push("no transactions found".to_string());
    } else if count > MAX_TRANSACTIONS {
        errors.push(format!("unusually high transaction count: {count}"));
    }
    if confidence < MIN_VALID_CONFIDENCE {
        errors.push(format!("low confidence score: {confidence:.2}"));
    }
    if payment == 0.0 {
        warnings.push("payment section not found".to_string());
    }
    if balance == 0.0 {
        warnings.push("balance section not found".to_string());
    }

    Validation {
        is_valid: errors.is_empty(),
        confidence,
        errors,
        warnings,
    }
}

pub fn detect_bank(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    BANKS
        .iter()
        .find(|(_, spellings)| spellings.iter().any(|s| upper.contains(s)))
        .map(|(name, _)| name.to_string())
}

fn last_four(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == 16).then(|| digits[12..].to_string())
}

fn capture_amount(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| parse_amount(&c[1]))
        .map(f64::abs)
}

/// Printed unsigned or `+` amounts are charges and stored negative.
fn movement_from(caps: &Captures, context: Option<NaiveDate>) -> Option<Transaction> {
    let operation_date = parse_statement_date(&caps["op"], context)?;
    let charge_date = match caps.name("charge") {
        Some(m) => Some(parse_statement_date(m.as_str(), context)?),
        None => None,
    };
    let printed = parse_amount(&caps["amount"])?;
    let description = caps["desc"].trim();
    if description.is_empty() {
        return None;
    }
    Some(Transaction::new(operation_date, charge_date, description, -printed))
}

fn installment_from(caps: &Captures, context: Option<NaiveDate>, interest_bearing: bool) -> Option<InstallmentPlan> {
    Some(InstallmentPlan {
        operation_date: parse_statement_date(&caps["op"], context),
        description: caps["desc"].trim().to_string(),
        original_amount: parse_amount(&caps["original"])?,
        pending_balance: parse_amount(&caps["pending"])?,
        required_payment: parse_amount(&caps["required"])?,
        payment_number: caps["n"].parse().ok()?,
        total_payments: caps["m"].parse().ok()?,
        interest_bearing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use estado_core::TransactionType;

    const STATEMENT: &str = "BANCO SANTANDER MEXICO
JUAN PEREZ LOPEZ
ESTADO DE CUENTA
Número de tarjeta: 1234 5678 9012 3456
RFC: PELJ800101AB1
TU PAGO REQUERIDO ESTE PERIODO
Periodo: Del 01-ENE-2023 al 31-ENE-2023
Fecha de corte: 31-ENE-2023
Fecha límite de pago: 20-FEB-2023
Pago para no generar intereses: $5,432.10
Pago mínimo: $350.00
RESUMEN DE CARGOS Y ABONOS DEL PERIODO
Adeudo del periodo anterior = $1,000.00
Cargos regulares (no a meses) + $755.80
Pagos y abonos - $2,000.00
Límite de crédito: $50,000.00
Crédito disponible: $44,567.90
Saldo deudor total: $5,432.10
DESGLOSE DE MOVIMIENTOS
COMPRAS Y CARGOS DIFERIDOS A MESES SIN INTERESES
10-DIC-2022  LIVERPOOL POLANCO  $6,000.00  $4,000.00  $1,000.00  2 DE 6
CARGOS, ABONOS Y COMPRAS REGULARES (NO A MESES)
15-ENE-2023 OXXO MONTERREY $55.80
16-ENE-2023 17-ENE-2023 PEMEX GAS 1234 $600.00
20-ENE-2023 SU PAGO GRACIAS - $2,000.00
28-DIC NETFLIX $100.00
";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn parser() -> TemplateParser {
        TemplateParser::new().unwrap()
    }

    #[test]
    fn test_full_statement() {
        let parsed = parser().parse(STATEMENT, None);
        assert!(parsed.is_valid(), "{:?}", parsed.validation);
        assert_eq!(parsed.payment.confidence, 1.0);
        assert_eq!(parsed.balance.confidence, 1.0);
        assert_eq!(parsed.transactions.confidence, 1.0);

        let meta = parsed.metadata();
        assert_eq!(meta.bank_name.as_deref(), Some("Santander"));
        assert_eq!(meta.customer_name.as_deref(), Some("JUAN PEREZ LOPEZ"));
        assert_eq!(meta.card_last_four.as_deref(), Some("3456"));
        assert_eq!(meta.rfc.as_deref(), Some("PELJ800101AB1"));
        assert_eq!(meta.period_start, Some(d(2023, 1, 1)));
        assert_eq!(meta.period_end, Some(d(2023, 1, 31)));
        assert_eq!(meta.due_date, Some(d(2023, 2, 20)));
        assert_eq!(meta.pay_no_interest, Some(5432.10));
        assert_eq!(meta.total_payments, Some(2000.0));
        assert_eq!(meta.credit_limit, Some(50000.0));
    }

    #[test]
    fn test_movement_lines() {
        let parsed = parser().parse(STATEMENT, None);
        let txns = &parsed.transactions.value;
        assert_eq!(txns.len(), 4);

        assert_eq!(txns[0].operation_date, d(2023, 1, 15));
        assert_eq!(txns[0].description, "OXXO MONTERREY");
        assert_eq!(txns[0].amount, -55.80);
        assert_eq!(txns[0].kind, TransactionType::Charge);

        assert_eq!(txns[1].charge_date, Some(d(2023, 1, 17)));
        assert_eq!(txns[1].description, "PEMEX GAS 1234");

        assert_eq!(txns[2].amount, 2000.0);
        assert_eq!(txns[2].kind, TransactionType::Payment);

        // December movement on a January statement
        assert_eq!(txns[3].operation_date, d(2022, 12, 28));
        assert!(txns.iter().all(Transaction::sign_consistent));
    }

    #[test]
    fn test_installments() {
        let parsed = parser().parse(STATEMENT, None);
        assert_eq!(parsed.installments.len(), 1);
        let plan = &parsed.installments[0];
        assert_eq!(plan.description, "LIVERPOOL POLANCO");
        assert_eq!(plan.original_amount, 6000.0);
        assert_eq!(plan.required_payment, 1000.0);
        assert_eq!((plan.payment_number, plan.total_payments), (2, 6));
        assert!(!plan.interest_bearing);
    }

    #[test]
    fn test_partial_payment_box() {
        let text = "Periodo: 01-ENE-2023 al 31-ENE-2023\nFecha de corte: 31-ENE-2023\nPago mínimo: $350.00";
        let payment = parser().payment_info(text);
        assert_eq!(payment.value.fields_found(), 4);
        assert!((payment.confidence - 4.0 / 6.0).abs() < 1e-9);

        let none = parser().payment_info("nada");
        assert_eq!(none.confidence, 0.0);
    }

    #[test]
    fn test_parenthesized_amount_is_payment() {
        let text = "DESGLOSE DE MOVIMIENTOS\n03-ENE-2023 DEVOLUCION AMAZON (150.00)\n";
        let section = parser().transactions(text, None);
        let txn = &section.transactions.value[0];
        assert_eq!(txn.amount, 150.0);
        assert_eq!(txn.kind, TransactionType::Payment);
    }

    #[test]
    fn test_unresolvable_date_lowers_confidence() {
        // no period to take a year from
        let text = "DESGLOSE DE MOVIMIENTOS\n15-ENE-2023 OXXO $55.80\n16-ENE PEMEX $600.00\n";
        let section = parser().transactions(text, None);
        assert_eq!(section.matched_lines, 2);
        assert_eq!(section.transactions.value.len(), 1);
        assert_eq!(section.transactions.confidence, 0.5);
    }

    #[test]
    fn test_lines_outside_sections_are_ignored() {
        let text = "15-ENE-2023 OXXO $55.80\n";
        let section = parser().transactions(text, None);
        assert_eq!(section.matched_lines, 0);
        assert!(section.transactions.value.is_empty());
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate(1.0, 1.0, 1.0, 5).is_valid);
        assert!(!validate(1.0, 1.0, 1.0, 0).is_valid);
        assert!(!validate(1.0, 1.0, 1.0, 1001).is_valid);
        let low = validate(0.0, 0.5, 1.0, 5);
        assert!(!low.is_valid);
        assert!((low.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_bank_from_filename_hint() {
        let info = parser().customer_info("sin banco", Some("estado_bbva_enero.pdf"));
        assert_eq!(info.bank_name.as_deref(), Some("BBVA"));
        assert_eq!(info.card_last_four, None);
    }

    #[test]
    fn test_card_suffix_variants() {
        let p = parser();
        assert_eq!(p.find_card_suffix("Numero de tarjeta: 4152-3137-0000-9876"), Some("9876".into()));
        assert_eq!(p.find_card_suffix("NÚMERO DE TARJETA 4152313700009876"), Some("9876".into()));
        assert_eq!(p.find_card_suffix("Número de tarjeta: 1234"), None);
    }
}
