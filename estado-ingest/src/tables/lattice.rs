//! Ruled tables: horizontal and vertical rules drawn in the content stream
//! define the cell grid, and text fragments are dropped into the cell that
//! contains them.

use estado_core::{Scored, ratio};

use super::{Table, TableBackend, TableMethod, cluster_positions};
use crate::error::TableError;
use crate::pdf::{PageLayout, PdfDocument};

/// Rules shorter than this (in points) are ignored
const MIN_RULE_LENGTH: f32 = 10.0;
/// Rules closer than this are the same grid line
const SNAP_TOLERANCE: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct LatticeBackend;

impl TableBackend for LatticeBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Lattice
    }

    fn extract(&self, pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        let doc = PdfDocument::load(pdf)?;
        let layout = doc.page_layout(page)?;
        Ok(lattice_tables(&layout))
    }
}

/// Confidence is the share of fragments inside the grid's vertical span
/// that landed in a cell.
pub fn lattice_tables(layout: &PageLayout) -> Scored<Vec<Table>> {
    let rows_y: Vec<f32> = layout
        .rulings
        .iter()
        .filter(|l| l.is_horizontal() && l.length() >= MIN_RULE_LENGTH)
        .map(|l| l.y0)
        .collect();
    let cols_x: Vec<f32> = layout
        .rulings
        .iter()
        .filter(|l| l.is_vertical() && l.length() >= MIN_RULE_LENGTH)
        .map(|l| l.x0)
        .collect();

    // top to bottom in PDF space means descending y
    let mut rows_y = cluster_positions(&rows_y, SNAP_TOLERANCE);
    rows_y.reverse();
    let cols_x = cluster_positions(&cols_x, SNAP_TOLERANCE);
    if rows_y.len() < 2 || cols_x.len() < 2 {
        return Scored::zero(Vec::new());
    }

    let n_rows = rows_y.len() - 1;
    let n_cols = cols_x.len() - 1;
    let mut cells = vec![vec![String::new(); n_cols]; n_rows];
    let (top, bottom) = (rows_y[0], rows_y[n_rows]);
    let (left, right) = (cols_x[0], cols_x[n_cols]);

    let mut in_span = 0;
    let mut assigned = 0;
    for frag in &layout.fragments {
        if frag.y > top || frag.y < bottom {
            continue;
        }
        in_span += 1;
        let cx = frag.center_x();
        if cx < left || cx > right {
            continue;
        }
        let row = rows_y.windows(2).position(|w| frag.y <= w[0] && frag.y >= w[1]);
        let col = cols_x.windows(2).position(|w| cx >= w[0] && cx <= w[1]);
        if let (Some(r), Some(c)) = (row, col) {
            let cell = &mut cells[r][c];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&frag.text);
            assigned += 1;
        }
    }

    let table = Table::new(cells).cleaned();
    if table.is_empty() {
        return Scored::zero(Vec::new());
    }
    Scored::new(vec![table], ratio(assigned, in_span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{RulingLine, TextFragment};

    fn frag(text: &str, x: f32, y: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            x,
            y,
            width: 5.0 * text.len() as f32,
            font_size: 10.0,
        }
    }

    fn h(y: f32) -> RulingLine {
        RulingLine { x0: 50.0, y0: y, x1: 450.0, y1: y }
    }

    fn v(x: f32) -> RulingLine {
        RulingLine { x0: x, y0: 600.0, x1: x, y1: 700.0 }
    }

    #[test]
    fn test_grid_cells_collect_text() {
        let layout = PageLayout {
            width: 612.0,
            height: 792.0,
            rulings: vec![h(700.0), h(650.0), h(600.0), h(600.5), v(50.0), v(150.0), v(450.0)],
            fragments: vec![
                frag("15-ENE", 60.0, 670.0),
                frag("OXXO", 160.0, 670.0),
                frag("MONTERREY", 190.0, 670.0),
                frag("16-ENE", 60.0, 620.0),
                frag("PEMEX", 160.0, 620.0),
                frag("Pie de pagina", 60.0, 100.0),
            ],
        };
        let scored = lattice_tables(&layout);
        assert_eq!(scored.confidence, 1.0);
        let table = &scored.value[0];
        assert_eq!(table.rows[0], vec!["15-ENE", "OXXO MONTERREY"]);
        assert_eq!(table.rows[1], vec!["16-ENE", "PEMEX"]);
    }

    #[test]
    fn test_no_rules_no_tables() {
        let layout = PageLayout {
            fragments: vec![frag("texto", 10.0, 10.0)],
            ..Default::default()
        };
        let scored = lattice_tables(&layout);
        assert!(scored.value.is_empty());
        assert_eq!(scored.confidence, 0.0);
    }
}
