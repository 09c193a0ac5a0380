//! Unruled tables inferred from text alignment: fragments are grouped into
//! lines by baseline, split into cells on horizontal gaps, and cells are
//! snapped to column anchors shared by most lines of a block.

use estado_core::Scored;

use super::{Table, TableBackend, TableMethod, cluster_positions, shape_confidence};
use crate::error::TableError;
use crate::pdf::{PageLayout, PdfDocument, TextFragment};

/// Cell starts closer than this share a column anchor
const COLUMN_TOLERANCE: f32 = 15.0;
/// Fewer consecutive multi-cell lines than this are not a table
const MIN_BLOCK_ROWS: usize = 3;
/// Score of a block where every row fills the same number of columns
const STREAM_CEILING: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamBackend;

impl TableBackend for StreamBackend {
    fn method(&self) -> TableMethod {
        TableMethod::Stream
    }

    fn extract(&self, pdf: &[u8], page: usize) -> Result<Scored<Vec<Table>>, TableError> {
        let doc = PdfDocument::load(pdf)?;
        let layout = doc.page_layout(page)?;
        Ok(stream_tables(&layout))
    }
}

struct Cell {
    x: f32,
    text: String,
}

pub fn stream_tables(layout: &PageLayout) -> Scored<Vec<Table>> {
    if layout.fragments.is_empty() {
        return Scored::zero(Vec::new());
    }

    let mut sizes: Vec<f32> = layout.fragments.iter().map(|f| f.font_size).collect();
    sizes.sort_by(f32::total_cmp);
    let median_size = sizes[sizes.len() / 2];
    let row_tolerance = (median_size * 0.5).max(2.0);

    let lines: Vec<Vec<Cell>> = group_lines(&layout.fragments, row_tolerance)
        .into_iter()
        .map(|line| split_cells(line, median_size))
        .collect();

    let mut tables = Vec::new();
    let mut scores = Vec::new();
    let mut block: Vec<Vec<Cell>> = Vec::new();
    for line in lines.into_iter().chain(std::iter::once(Vec::new())) {
        if line.len() >= 2 {
            block.push(line);
            continue;
        }
        if block.len() >= MIN_BLOCK_ROWS {
            if let Some((table, score)) = build_table(&block) {
                tables.push(table);
                scores.push(score);
            }
        }
        block.clear();
    }

    let confidence = estado_core::mean(&scores);
    Scored::new(tables, confidence)
}

/// Lines from top to bottom, fragments left to right.
fn group_lines(fragments: &[TextFragment], tolerance: f32) -> Vec<Vec<&TextFragment>> {
    let mut sorted: Vec<&TextFragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut lines: Vec<Vec<&TextFragment>> = Vec::new();
    let mut line_y = f32::NAN;
    for frag in sorted {
        match lines.last_mut() {
            Some(line) if (line_y - frag.y).abs() <= tolerance => line.push(frag),
            _ => {
                lines.push(vec![frag]);
                line_y = frag.y;
            }
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
}

/// Merge fragments separated by less than about one character into one cell.
fn split_cells(line: Vec<&TextFragment>, font_size: f32) -> Vec<Cell> {
    let gap_limit = font_size.max(1.0);
    let mut cells: Vec<Cell> = Vec::new();
    let mut last_right = f32::NEG_INFINITY;
    for frag in line {
        match cells.last_mut() {
            Some(cell) if frag.x - last_right < gap_limit => {
                cell.text.push(' ');
                cell.text.push_str(&frag.text);
            }
            _ => cells.push(Cell {
                x: frag.x,
                text: frag.text.clone(),
            }),
        }
        last_right = frag.right();
    }
    cells
}

fn build_table(block: &[Vec<Cell>]) -> Option<(Table, f64)> {
    let starts: Vec<f32> = block.iter().flatten().map(|c| c.x).collect();
    let candidates = cluster_positions(&starts, COLUMN_TOLERANCE);
    let min_hits = (block.len() / 2).max(2);
    let anchors: Vec<f32> = candidates
        .into_iter()
        .filter(|a| {
            block
                .iter()
                .filter(|line| line.iter().any(|c| (c.x - a).abs() <= COLUMN_TOLERANCE))
                .count()
                >= min_hits
        })
        .collect();
    if anchors.len() < 2 {
        return None;
    }

    let rows: Vec<Vec<String>> = block
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); anchors.len()];
            for cell in line {
                let col = anchors
                    .iter()
                    .rposition(|a| *a <= cell.x + COLUMN_TOLERANCE)
                    .unwrap_or(0);
                if !row[col].is_empty() {
                    row[col].push(' ');
                }
                row[col].push_str(&cell.text);
            }
            row
        })
        .collect();

    let table = Table::new(rows).cleaned();
    if table.is_empty() {
        return None;
    }

    let score = shape_confidence(std::slice::from_ref(&table), STREAM_CEILING);
    Some((table, score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, x: f32, y: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            x,
            y,
            width: 5.0 * text.len() as f32,
            font_size: 10.0,
        }
    }

    #[test]
    fn test_aligned_block_becomes_table() {
        let mut fragments = vec![frag("ESTADO DE CUENTA", 50.0, 750.0)];
        for (i, (date, desc, amt)) in [
            ("15-ENE", "OXXO", "55.80"),
            ("16-ENE", "PEMEX", "600.00"),
            ("17-ENE", "NETFLIX", "199.00"),
            ("18-ENE", "UBER", "85.50"),
        ]
        .iter()
        .enumerate()
        {
            let y = 700.0 - 20.0 * i as f32;
            fragments.push(frag(date, 50.0, y));
            fragments.push(frag(desc, 150.0, y + 0.5));
            fragments.push(frag(amt, 400.0, y));
        }
        let layout = PageLayout {
            fragments,
            ..Default::default()
        };

        let scored = stream_tables(&layout);
        assert_eq!(scored.value.len(), 1);
        let table = &scored.value[0];
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.rows[2], vec!["17-ENE", "NETFLIX", "199.00"]);
        assert!((scored.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_adjacent_fragments_merge() {
        let a = frag("OXXO", 100.0, 10.0);
        let b = frag("MONTERREY", 123.0, 10.0);
        let cells = split_cells(vec![&a, &b], 10.0);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].text, "OXXO MONTERREY");
    }

    #[test]
    fn test_prose_is_not_a_table() {
        let layout = PageLayout {
            fragments: vec![frag("Una linea", 50.0, 700.0), frag("Otra linea", 50.0, 680.0)],
            ..Default::default()
        };
        assert!(stream_tables(&layout).value.is_empty());
    }
}
