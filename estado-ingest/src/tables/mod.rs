//! Table extraction: several backends tried per page in order, with OCR as
//! the last resort.

pub mod detect;
pub mod engine;
pub mod lattice;
pub mod layout;
pub mod native;
pub mod stream;

use estado_core::Scored;
use serde::{Deserialize, Serialize};

use crate::error::TableError;

pub use detect::TransactionTableDetector;
pub use engine::TableExtractionEngine;
pub use lattice::LatticeBackend;
pub use layout::LayoutBackend;
pub use native::NativeBackend;
pub use stream::StreamBackend;

/// Header placed before rendered tables so the template parser finds its section
pub const TRANSACTION_SECTION_HEADER: &str = "DESGLOSE DE MOVIMIENTOS";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TableMethod {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "lattice")]
    Lattice,
    #[serde(rename = "stream")]
    Stream,
    #[serde(rename = "layout")]
    Layout,
    #[serde(rename = "ocr")]
    Ocr,
}

impl TableMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableMethod::Native => "native",
            TableMethod::Lattice => "lattice",
            TableMethod::Stream => "stream",
            TableMethod::Layout => "layout",
            TableMethod::Ocr => "ocr",
        }
    }
}

/// A grid of cell strings. Rows may be ragged until [`Table::cleaned`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|c| c.trim().is_empty()))
    }

    /// Trim cells, drop empty rows and empty columns, pad rows to equal width.
    pub fn cleaned(&self) -> Table {
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|c| c.trim().to_string()).collect::<Vec<_>>())
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let keep: Vec<usize> = (0..width)
            .filter(|&col| rows.iter().any(|r| r.get(col).is_some_and(|c| !c.is_empty())))
            .collect();
        Table {
            rows: rows
                .into_iter()
                .map(|r| keep.iter().map(|&col| r.get(col).cloned().unwrap_or_default()).collect())
                .collect(),
        }
    }

    /// One line per row, cells separated by two spaces.
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What one backend produced for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExtraction {
    pub method: TableMethod,
    pub tables: Vec<Table>,
    pub confidence: f64,
    pub error: Option<String>,
    /// Plain recognized text, only set by OCR
    pub text: Option<String>,
}

impl TableExtraction {
    pub fn from_scored(method: TableMethod, scored: Scored<Vec<Table>>) -> Self {
        let (tables, confidence) = scored.into_parts();
        Self {
            method,
            tables,
            confidence,
            error: None,
            text: None,
        }
    }

    pub fn failed(method: TableMethod, error: impl Into<String>) -> Self {
        Self {
            method,
            tables: Vec::new(),
            confidence: 0.0,
            error: Some(error.into()),
            text: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && !self.tables.is_empty()
    }
}

/// One table-detection technique.
pub trait TableBackend: Send + Sync {
    fn method(&self) -> TableMethod;

    fn is_available(&self) -> bool {
        true
    }

    /// Tables found on the 0-based `page`, with the backend's confidence.
    fn extract(&self, pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError>;
}

/// Render tables as text under the transaction section header.
pub fn render_tables_as_text(tables: &[Table]) -> String {
    let mut out = String::from(TRANSACTION_SECTION_HEADER);
    out.push('\n');
    for table in tables {
        let body = table.to_text();
        if !body.is_empty() {
            out.push_str(&body);
            out.push('\n');
        }
    }
    out
}

/// Split text lines into cells on runs of two or more spaces and group
/// consecutive multi-cell lines into tables of at least two rows.
pub fn tables_from_lines(text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let cells = split_columns(line);
        if cells.len() >= 2 {
            current.push(cells);
        } else if !current.is_empty() {
            flush(&mut current, &mut tables);
        }
    }
    flush(&mut current, &mut tables);
    tables
}

/// Cells of a fixed-width line: runs of two or more spaces (or a tab) separate them.
pub fn split_columns(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut spaces = 0;
    for ch in line.trim().chars() {
        if ch == '\t' || (ch == ' ' && spaces >= 1) {
            spaces = 2;
            continue;
        }
        if ch == ' ' {
            spaces = 1;
            continue;
        }
        if spaces >= 2 && !cell.is_empty() {
            cells.push(std::mem::take(&mut cell));
        } else if spaces == 1 {
            cell.push(' ');
        }
        spaces = 0;
        cell.push(ch);
    }
    if !cell.is_empty() {
        cells.push(cell);
    }
    cells
}

/// Sort positions and merge neighbours closer than `tolerance`, returning group means.
pub(crate) fn cluster_positions(values: &[f32], tolerance: f32) -> Vec<f32> {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f32::total_cmp);

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for v in sorted {
        match clusters.last_mut() {
            Some(group) if group.last().is_some_and(|last| v - last <= tolerance) => group.push(v),
            _ => clusters.push(vec![v]),
        }
    }
    clusters
        .iter()
        .map(|g| g.iter().sum::<f32>() / g.len() as f32)
        .collect()
}

/// Share of rows whose filled-cell count equals the most common one.
pub(crate) fn row_consistency(table: &Table) -> f64 {
    let filled: Vec<usize> = table
        .rows
        .iter()
        .map(|r| r.iter().filter(|c| !c.trim().is_empty()).count())
        .collect();
    let modal = (1..=table.column_count())
        .max_by_key(|n| filled.iter().filter(|f| *f == n).count())
        .unwrap_or(0);
    let consistent = filled.iter().filter(|f| **f == modal).count();
    estado_core::ratio(consistent, filled.len())
}

/// `ceiling` scaled by row consistency, 0.1 less for tables under four rows,
/// averaged over `tables`.
pub(crate) fn shape_confidence(tables: &[Table], ceiling: f64) -> f64 {
    let scores: Vec<f64> = tables
        .iter()
        .map(|t| {
            let mut score = ceiling * row_consistency(t);
            if t.row_count() < 4 {
                score -= 0.1;
            }
            score.clamp(0.0, 1.0)
        })
        .collect();
    estado_core::mean(&scores)
}

fn flush(current: &mut Vec<Vec<String>>, tables: &mut Vec<Table>) {
    if current.len() >= 2 {
        tables.push(Table::new(std::mem::take(current)).cleaned());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_cleaned_drops_empty_rows_and_columns() {
        let t = Table::new(vec![
            row(&["15-ENE", "", "OXXO", "55.80"]),
            row(&["", "", "", ""]),
            row(&["16-ENE", "", "PEMEX"]),
        ])
        .cleaned();
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.rows[1], row(&["16-ENE", "PEMEX", ""]));
    }

    #[test]
    fn test_tables_from_lines() {
        let text = "ESTADO DE CUENTA\n\
                    15-ENE-2023   OXXO MONTERREY     $55.80\n\
                    16-ENE-2023   PEMEX CENTRO       $600.00\n\
                    nota suelta\n\
                    solo  dos\n";
        let tables = tables_from_lines(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[0], row(&["15-ENE-2023", "OXXO MONTERREY", "$55.80"]));
    }

    #[test]
    fn test_cluster_positions() {
        let c = cluster_positions(&[100.0, 50.0, 51.0, 99.0, 200.0], 2.0);
        assert_eq!(c, vec![50.5, 99.5, 200.0]);
    }

    #[test]
    fn test_shape_confidence() {
        let even = Table::new(vec![
            row(&["15-ENE-2023", "OXXO", "$55.80"]),
            row(&["16-ENE-2023", "PEMEX", "$600.00"]),
            row(&["17-ENE-2023", "SORIANA", "$310.00"]),
            row(&["18-ENE-2023", "VIPS", "$250.00"]),
        ]);
        assert_eq!(row_consistency(&even), 1.0);
        assert!((shape_confidence(&[even], 0.8) - 0.8).abs() < 1e-9);

        let ragged = Table::new(vec![
            row(&["15-ENE-2023", "OXXO", "$55.80"]),
            row(&["nota", "", ""]),
            row(&["16-ENE-2023", "PEMEX", "$600.00"]),
        ]);
        assert!((row_consistency(&ragged) - 2.0 / 3.0).abs() < 1e-9);
        assert!(shape_confidence(&[ragged], 0.8) < 0.5);
        assert_eq!(shape_confidence(&[], 0.8), 0.0);
    }

    #[test]
    fn test_render_prefixes_section_header() {
        let t = Table::new(vec![row(&["15-ENE-2023", "OXXO", "$55.80"])]);
        let text = render_tables_as_text(&[t]);
        assert_eq!(text, "DESGLOSE DE MOVIMIENTOS\n15-ENE-2023  OXXO  $55.80\n");
    }
}
