//! Workbook sheets (xlsx, xls, xlsb, ods) read with calamine.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{BoqError, BoqResult, SectionWarning};
use crate::sheet::{records_from_rows, CellValue, Record, SheetReadError, SheetSource, UsedRange};

/// One worksheet's cell range.
pub struct WorkbookSheet {
    name: String,
    range: Range<Data>,
}

impl WorkbookSheet {
    pub fn new(name: impl Into<String>, range: Range<Data>) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        // Excel serial date; dates never feed numeric fields
        Data::DateTime(dt) => CellValue::Text(dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#ERR:{:?}", e)),
    }
}

impl SheetSource for WorkbookSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn structured_rows(&self) -> Result<Vec<Vec<CellValue>>, SheetReadError> {
        if self.range.is_empty() {
            return Err(SheetReadError::Malformed("empty range".to_string()));
        }
        Ok(self
            .range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect())
    }

    fn records(&self) -> Result<Vec<Record>, SheetReadError> {
        records_from_rows(&self.structured_rows()?)
    }

    fn used_range(&self) -> Option<UsedRange> {
        let (start_row, start_col) = self.range.start()?;
        let (end_row, end_col) = self.range.end()?;
        Some(UsedRange {
            start_row: start_row as usize,
            start_col: start_col as usize,
            end_row: end_row as usize,
            end_col: end_col as usize,
        })
    }

    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.range
            .get_value((row as u32, col as u32))
            .map(cell_value)
            .unwrap_or_default()
    }
}

/// Open every worksheet. A sheet whose range cannot be read becomes a warning.
pub fn open_workbook_sheets(path: &Path) -> BoqResult<(Vec<WorkbookSheet>, Vec<SectionWarning>)> {
    let mut workbook = open_workbook_auto(path).map_err(|e| BoqError::spreadsheet(path.display().to_string(), e))?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();
    let mut warnings = Vec::new();

    for name in names {
        match workbook.worksheet_range(&name) {
            Ok(range) => sheets.push(WorkbookSheet::new(name, range)),
            Err(e) => {
                warn!(sheet = %name, error = %e, "Skipping unreadable sheet");
                warnings.push(SectionWarning::new(format!("sheet {:?}", name), e.to_string()));
            }
        }
    }

    info!(path = %path.display(), sheets = sheets.len(), "📊 Opened workbook");
    Ok((sheets, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::sheet::{FallbackReader, ParseStrategy};

    fn range_at(start: (u32, u32), cells: &[&[Data]]) -> Range<Data> {
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let end = (start.0 + cells.len() as u32 - 1, start.1 + width - 1);
        let mut range = Range::new(start, end);
        for (r, row) in cells.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                range.set_value((start.0 + r as u32, start.1 + c as u32), value.clone());
            }
        }
        range
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn test_structured_read_of_range() {
        let range = range_at(
            (0, 0),
            &[
                &[text("Code"), text("Description"), text("Qty")],
                &[text("001"), text("Concrete"), Data::Float(50.0)],
            ],
        );
        let sheet = WorkbookSheet::new("Civil", range);
        let parsed = FallbackReader::new(&QualityConfig::default()).read_sheet(&sheet).unwrap();

        assert_eq!(parsed.strategy, ParseStrategy::Structured);
        assert_eq!(parsed.rows[0][2], CellValue::Number(50.0));
        assert_eq!(parsed.rows[0][0], CellValue::Text("001".to_string()));
    }

    #[test]
    fn test_offset_range_uses_absolute_cells() {
        let range = range_at((3, 2), &[&[text("Unit"), text("Qty")], &[text("m2"), Data::Int(4)]]);
        let sheet = WorkbookSheet::new("offset", range);

        let used = sheet.used_range().unwrap();
        assert_eq!((used.start_row, used.start_col), (3, 2));
        assert_eq!(sheet.cell(4, 3), CellValue::Number(4.0));
        assert_eq!(sheet.cell(0, 0), CellValue::Empty);
    }

    #[test]
    fn test_missing_workbook_is_document_error() {
        let result = open_workbook_sheets(Path::new("/nonexistent/boq.xlsx"));
        assert!(matches!(result, Err(BoqError::Spreadsheet { .. })));
    }
}
