//! Heuristic filter for tables that hold statement movements.
//!
//! A table passes on date density, on any currency-looking cell or on a
//! movement keyword. Large tables pass without inspection.

use regex::Regex;

use super::Table;

const MOVEMENT_KEYWORDS: &[&str] = &[
    "PAGO",
    "COMPRA",
    "RETIRO",
    "DEPOSITO",
    "TRANSFERENCIA",
    "RESTAURANTE",
    "TIENDA",
    "FARMACIA",
    "GASOLINA",
    "ATM",
    "VISA",
    "MASTERCARD",
    "DEBITO",
    "CREDITO",
];

/// Only the first few columns are scanned for dates and amounts
const SCANNED_COLUMNS: usize = 5;

pub struct TransactionTableDetector {
    date_patterns: Vec<Regex>,
    amount_patterns: Vec<Regex>,
}

impl TransactionTableDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let date_patterns = [
            r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}",
            r"\d{1,2}[-/ ][A-Za-z]{3}[-/ ]\d{2,4}",
            r"\b[A-Za-z]{3}-\d{1,2}\b",
            r"\b\d{1,2}[-/][A-Za-z]{3}\b",
            r"\b\d{1,2}/\d{1,2}\b",
        ]
        .into_iter()
        .map(Regex::new)
        .collect::<Result<Vec<_>, _>>()?;
        let amount_patterns = [r"\$\s*[\d,]+\.?\d*", r"[\d,]+\.?\d*\s*\$", r"[\d,]+\.\d{2}"]
            .into_iter()
            .map(Regex::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            date_patterns,
            amount_patterns,
        })
    }

    pub fn looks_like_transaction_table(&self, table: &Table) -> bool {
        let rows = table.row_count();
        let cols = table.column_count();
        if rows == 0 || table.is_empty() {
            return false;
        }
        if rows >= 10 && cols >= 3 {
            return true;
        }

        let scanned: Vec<&str> = table
            .rows
            .iter()
            .flat_map(|r| r.iter().take(SCANNED_COLUMNS))
            .map(String::as_str)
            .collect();
        let date_cells = scanned
            .iter()
            .filter(|cell| self.date_patterns.iter().any(|re| re.is_match(cell)))
            .count();
        let date_ratio = date_cells as f64 / scanned.len().max(1) as f64;
        let has_amounts = scanned
            .iter()
            .any(|cell| self.amount_patterns.iter().any(|re| re.is_match(cell)));

        let all_text = table
            .rows
            .iter()
            .flatten()
            .map(|c| c.to_uppercase())
            .collect::<Vec<_>>()
            .join(" ");
        let has_keywords = MOVEMENT_KEYWORDS.iter().any(|k| all_text.contains(k));

        date_ratio > 0.1 || has_amounts || has_keywords || (rows > 20 && cols >= 4)
    }

    /// Tables that pass [`Self::looks_like_transaction_table`].
    pub fn filter<'a>(&self, tables: impl IntoIterator<Item = &'a Table>) -> Vec<Table> {
        tables
            .into_iter()
            .filter(|t| self.looks_like_transaction_table(t))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Table {
        Table::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_accepts_movement_rows() {
        let d = TransactionTableDetector::new().unwrap();
        assert!(d.looks_like_transaction_table(&table(&[&["15-ENE-2023", "OXXO", "55.80"]])));
        assert!(d.looks_like_transaction_table(&table(&[&["SU PAGO", "GRACIAS"]])));
    }

    #[test]
    fn test_rejects_prose() {
        let d = TransactionTableDetector::new().unwrap();
        assert!(!d.looks_like_transaction_table(&table(&[&["HOLA", "MUNDO"], &["SIN", "DATOS"]])));
        assert!(!d.looks_like_transaction_table(&Table::default()));
    }

    #[test]
    fn test_large_tables_pass() {
        let d = TransactionTableDetector::new().unwrap();
        let rows: Vec<&[&str]> = (0..10).map(|_| &["a", "b", "c"][..]).collect();
        assert!(d.looks_like_transaction_table(&table(&rows)));
    }
}
