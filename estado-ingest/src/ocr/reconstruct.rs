//! Rebuild rows and tables from OCR word boxes.

use super::OcrWord;
use crate::tables::Table;

/// Words whose top edge is within this distance of a row's mean top join that row
pub const ROW_TOLERANCE_PX: f32 = 10.0;

/// Group words into rows by vertical position, each row sorted left to right.
pub fn group_rows(words: &[OcrWord], tolerance: f32) -> Vec<Vec<OcrWord>> {
    let mut sorted: Vec<&OcrWord> = words.iter().filter(|w| !w.text.trim().is_empty()).collect();
    sorted.sort_by_key(|w| (w.top, w.left));

    let mut rows: Vec<Vec<OcrWord>> = Vec::new();
    for word in sorted {
        let joins_last = rows
            .last()
            .is_some_and(|row| (word.top as f32 - mean_top(row)).abs() <= tolerance);
        match rows.last_mut() {
            Some(row) if joins_last => row.push(word.clone()),
            _ => rows.push(vec![word.clone()]),
        }
    }
    for row in &mut rows {
        row.sort_by_key(|w| w.left);
    }
    rows
}

fn mean_top(row: &[OcrWord]) -> f32 {
    row.iter().map(|w| w.top as f32).sum::<f32>() / row.len().max(1) as f32
}

/// One cell per word, rows padded to the widest row.
pub fn rows_to_table(rows: &[Vec<OcrWord>]) -> Option<Table> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return None;
    }
    let cells = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(|w| w.text.trim().to_string()).collect();
            cells.resize(width, String::new());
            cells
        })
        .collect();
    let table = Table::new(cells).cleaned();
    (!table.is_empty()).then_some(table)
}

pub fn rows_to_text(rows: &[Vec<OcrWord>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|w| w.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::tests::word;

    #[test]
    fn test_rows_follow_running_mean() {
        let words = vec![
            word("B", 50, 108),
            word("A", 10, 100),
            word("C", 90, 117),
            word("D", 10, 130),
        ];
        let rows = group_rows(&words, ROW_TOLERANCE_PX);
        let texts: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| r.iter().map(|w| w.text.as_str()).collect())
            .collect();
        // mean of 100 and 108 is 104, so 117 starts a new row
        assert_eq!(texts, vec![vec!["A", "B"], vec!["C"], vec!["D"]]);
    }

    #[test]
    fn test_table_is_padded() {
        let rows = group_rows(&[word("A", 0, 0), word("B", 30, 0), word("C", 0, 50)], 10.0);
        let table = rows_to_table(&rows).unwrap();
        assert_eq!(table.rows, vec![vec!["A", "B"], vec!["C", ""]]);
        assert_eq!(rows_to_text(&rows), "A B\nC");
        assert!(rows_to_table(&[]).is_none());
    }
}
