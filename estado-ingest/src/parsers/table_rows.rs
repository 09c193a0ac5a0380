//! Movements read straight from table cells, used when rendered tables do
//! not satisfy the template parser (OCR grids mostly, where a date or an
//! amount is often split across neighbouring cells).

use chrono::NaiveDate;
use estado_core::{Scored, Transaction, parse_amount, parse_statement_date, ratio};
use tracing::debug;

use crate::tables::Table;

#[derive(Debug, Clone, Default)]
pub struct TableRowParser {
    context: Option<NaiveDate>,
}

impl TableRowParser {
    /// `context` resolves dates printed without a year (usually the period end).
    pub fn new(context: Option<NaiveDate>) -> Self {
        Self { context }
    }

    /// Rows that start with a date are candidates; confidence is the share
    /// of candidates that also carried an amount and a description.
    pub fn parse(&self, tables: &[Table]) -> Scored<Vec<Transaction>> {
        let mut candidates = 0;
        let mut transactions = Vec::new();
        for row in tables.iter().flat_map(|t| t.rows.iter()) {
            let cells: Vec<&str> = row.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
            let Some((operation_date, used)) = self.take_date(&cells) else {
                continue;
            };
            candidates += 1;
            match self.row_to_transaction(operation_date, &cells[used..]) {
                Some(txn) => transactions.push(txn),
                None => debug!(row = cells.join(" | "), "table row without amount or description"),
            }
        }
        let confidence = ratio(transactions.len(), candidates);
        Scored::new(transactions, confidence)
    }

    /// A date in the first cell, or spread over the first two or three.
    fn take_date(&self, cells: &[&str]) -> Option<(NaiveDate, usize)> {
        (1..=cells.len().min(3)).rev().find_map(|n| {
            parse_statement_date(&cells[..n].join(" "), self.context).map(|d| (d, n))
        })
    }

    fn row_to_transaction(&self, operation_date: NaiveDate, rest: &[&str]) -> Option<Transaction> {
        let charge = self.take_date(rest);
        let rest = match charge {
            Some((_, used)) => &rest[used..],
            None => rest,
        };

        let amount_idx = rest.iter().rposition(|c| is_amount_cell(c))?;
        let mut printed = parse_amount(rest[amount_idx])?;
        let mut desc_end = amount_idx;
        if amount_idx > 0 && matches!(rest[amount_idx - 1], "-" | "$" | "-$" | "+") {
            if rest[amount_idx - 1].starts_with('-') && printed > 0.0 {
                printed = -printed;
            }
            desc_end -= 1;
        }

        let description = rest[..desc_end]
            .iter()
            .filter(|c| !is_amount_cell(c))
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if description.is_empty() {
            return None;
        }
        Some(Transaction::new(
            operation_date,
            charge.map(|(d, _)| d),
            description,
            -printed,
        ))
    }
}

/// Cells like `$1,234.56`, `- 55.80` or `(15.00)`: a parseable amount with cents.
fn is_amount_cell(cell: &str) -> bool {
    cell.contains('.') && cell.chars().any(|c| c.is_ascii_digit()) && parse_amount(cell).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use estado_core::TransactionType;

    fn table(rows: &[&[&str]]) -> Table {
        Table::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rows_with_dates_and_amounts() {
        let t = table(&[
            &["FECHA", "DESCRIPCION", "MONTO"],
            &["15-ENE-2023", "OXXO", "MONTERREY", "$55.80"],
            &["16-ENE-2023", "17-ENE-2023", "PEMEX", "$600.00"],
            &["20-ENE-2023", "SU PAGO", "-", "$2,000.00"],
        ]);
        let scored = TableRowParser::new(None).parse(&[t]);
        assert_eq!(scored.confidence, 1.0);
        let txns = &scored.value;
        assert_eq!(txns.len(), 3);
        assert_eq!(txns[0].description, "OXXO MONTERREY");
        assert_eq!(txns[0].amount, -55.80);
        assert_eq!(txns[1].charge_date, Some(d(2023, 1, 17)));
        assert_eq!(txns[2].amount, 2000.0);
        assert_eq!(txns[2].kind, TransactionType::Payment);
    }

    #[test]
    fn test_ocr_split_date() {
        let t = table(&[&["15", "ENE", "OXXO", "55.80"]]);
        let scored = TableRowParser::new(Some(d(2023, 1, 31))).parse(&[t]);
        assert_eq!(scored.value[0].operation_date, d(2023, 1, 15));
        assert_eq!(scored.value[0].description, "OXXO");
    }

    #[test]
    fn test_row_without_amount_lowers_confidence() {
        let t = table(&[
            &["15-ENE-2023", "OXXO", "$55.80"],
            &["16-ENE-2023", "PEMEX", "pendiente"],
        ]);
        let scored = TableRowParser::new(None).parse(&[t]);
        assert_eq!(scored.value.len(), 1);
        assert_eq!(scored.confidence, 0.5);
    }
}
