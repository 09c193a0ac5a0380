//! CSV export of extracted transactions.

use std::io;
use std::path::Path;

use chrono::NaiveDate;
use estado_core::{CategorizationMethod, Category, Transaction, TransactionType};
use serde::Serialize;

/// One CSV line. `category` is the effective category, overrides applied.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    operation_date: NaiveDate,
    charge_date: Option<NaiveDate>,
    description: &'a str,
    amount: f64,
    #[serde(rename = "type")]
    kind: TransactionType,
    category: Category,
    categorization_method: CategorizationMethod,
    categorization_confidence: f64,
    is_recurring: bool,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(t: &'a Transaction) -> Self {
        Self {
            operation_date: t.operation_date,
            charge_date: t.charge_date,
            description: &t.description,
            amount: t.amount,
            kind: t.kind,
            category: t.effective_category(),
            categorization_method: t.categorization_method,
            categorization_confidence: t.categorization_confidence,
            is_recurring: t.is_recurring,
        }
    }
}

pub fn write_transactions_csv<W: io::Write>(writer: W, transactions: &[Transaction]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for txn in transactions {
        wtr.serialize(CsvRow::from(txn))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(path: impl AsRef<Path>, transactions: &[Transaction]) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path.as_ref())?;
    write_transactions_csv(file, transactions)
}
