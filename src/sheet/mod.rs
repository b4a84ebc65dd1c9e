//! Spreadsheet-like sources and the fallback reader that turns them into rows.

pub mod quality;
pub mod strategies;

pub use quality::{clean_rows, DataQualityReport};
pub use strategies::{FallbackReader, ParseStrategy, ParsedSheet, WorkbookReadout};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::numerals::{is_plain_number, normalize_numeral};

/// One spreadsheet cell as handed over by a sheet reader.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Text(text) => text.clone(),
        }
    }

    /// Trim text, turn blanks into `Empty` and bare numerals (any digit script) into numbers.
    pub fn cleaned(self) -> CellValue {
        match self {
            CellValue::Text(text) => {
                let trimmed = text.trim();
                let western = normalize_numeral(trimmed);
                if trimmed.is_empty() {
                    CellValue::Empty
                } else if is_plain_number(trimmed) && !is_zero_padded(&western) {
                    western
                        .parse::<f64>()
                        .map(CellValue::Number)
                        .unwrap_or_else(|_| CellValue::Text(trimmed.to_string()))
                } else {
                    CellValue::Text(trimmed.to_string())
                }
            }
            CellValue::Number(n) if !n.is_finite() => CellValue::Empty,
            other => other,
        }
    }
}

// `001` is an item code, not the number one
fn is_zero_padded(digits: &str) -> bool {
    let unsigned = digits.trim_start_matches('-');
    unsigned.len() > 1 && unsigned.starts_with('0') && !unsigned[1..].starts_with('.')
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// A keyed row, field order preserved as read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<(String, CellValue)>,
}

impl Record {
    pub fn new(fields: Vec<(String, CellValue)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_empty())
    }
}

/// Inclusive, absolute cell coordinates of a sheet's populated area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetReadError {
    #[error("{0} reading is not supported by this source")]
    Unsupported(&'static str),
    #[error("malformed sheet: {0}")]
    Malformed(String),
}

/// Access to a single sheet at decreasing levels of structure.
///
/// Readers implement whatever they can; the [`FallbackReader`] tries each level in turn.
pub trait SheetSource {
    fn name(&self) -> &str;

    /// Every row positionally, row 0 expected to be the header.
    fn structured_rows(&self) -> Result<Vec<Vec<CellValue>>, SheetReadError>;

    /// One keyed record per data row.
    fn records(&self) -> Result<Vec<Record>, SheetReadError> {
        Err(SheetReadError::Unsupported("record"))
    }

    /// Declared populated area for cell-by-cell scanning.
    fn used_range(&self) -> Option<UsedRange> {
        None
    }

    fn cell(&self, _row: usize, _col: usize) -> CellValue {
        CellValue::Empty
    }
}

/// In-memory sheet, used by callers that already hold a cell grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellGrid {
    pub name: String,
    pub cells: Vec<Vec<CellValue>>,
}

impl CellGrid {
    pub fn new(name: impl Into<String>, cells: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Build a grid from string cells; empty strings become `Empty`.
    pub fn from_strings<R, S>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| CellValue::from(s.as_ref())).collect())
            .collect();
        Self::new(name, cells)
    }

    fn width(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl SheetSource for CellGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn structured_rows(&self) -> Result<Vec<Vec<CellValue>>, SheetReadError> {
        Ok(self.cells.clone())
    }

    fn records(&self) -> Result<Vec<Record>, SheetReadError> {
        records_from_rows(&self.cells)
    }

    fn used_range(&self) -> Option<UsedRange> {
        if self.cells.is_empty() || self.width() == 0 {
            return None;
        }
        Some(UsedRange {
            start_row: 0,
            start_col: 0,
            end_row: self.cells.len() - 1,
            end_col: self.width() - 1,
        })
    }

    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }
}

/// Key each row after the first by the first row's texts. Blank header cells get `__EMPTY_n`.
pub fn records_from_rows(rows: &[Vec<CellValue>]) -> Result<Vec<Record>, SheetReadError> {
    let Some((header, data)) = rows.split_first() else {
        return Err(SheetReadError::Malformed("sheet has no rows".to_string()));
    };

    let keys: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let text = cell.as_text().trim().to_string();
            if text.is_empty() {
                format!("__EMPTY_{}", i)
            } else {
                text
            }
        })
        .collect();

    Ok(data
        .iter()
        .map(|row| {
            Record::new(
                keys.iter()
                    .enumerate()
                    .map(|(i, key)| (key.clone(), row.get(i).cloned().unwrap_or_default()))
                    .collect(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaned_cells() {
        assert_eq!(CellValue::from("  42 ").cleaned(), CellValue::Number(42.0));
        assert_eq!(CellValue::from("٥٠").cleaned(), CellValue::Number(50.0));
        assert_eq!(CellValue::from("001").cleaned(), CellValue::Text("001".to_string()));
        assert_eq!(CellValue::from("0.5").cleaned(), CellValue::Number(0.5));
        assert_eq!(CellValue::from(" m3 ").cleaned(), CellValue::Text("m3".to_string()));
        assert_eq!(CellValue::from("   ").cleaned(), CellValue::Empty);
        assert_eq!(CellValue::Number(f64::NAN).cleaned(), CellValue::Empty);
    }

    #[test]
    fn test_as_text_drops_integer_fraction() {
        assert_eq!(CellValue::Number(7500.0).as_text(), "7500");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::Empty.as_text(), "");
    }

    #[test]
    fn test_records_from_rows() {
        let grid = CellGrid::from_strings("s", [vec!["Code", "", "Qty"], vec!["001", "x", "5"]]);
        let records = grid.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Qty"), Some(&CellValue::Text("5".to_string())));
        assert_eq!(records[0].get("__EMPTY_1"), Some(&CellValue::Text("x".to_string())));
    }

    #[test]
    fn test_grid_used_range() {
        let grid = CellGrid::from_strings("s", [vec!["a", "b"], vec!["c"]]);
        let range = grid.used_range().unwrap();
        assert_eq!((range.end_row, range.end_col), (1, 1));
        assert_eq!(grid.cell(1, 1), CellValue::Empty);
        assert!(CellGrid::default().used_range().is_none());
    }
}
