use std::io::Read;
use std::path::Path;

use crate::error::{BoqError, BoqResult};
use crate::sheet::{records_from_rows, CellValue, Record, SheetReadError, SheetSource, UsedRange};

/// A CSV file as a single sheet. Rows may have differing lengths.
pub struct CsvSheet {
    name: String,
    rows: Vec<csv::StringRecord>,
}

impl CsvSheet {
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R, delimiter: u8) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .delimiter(delimiter)
            .from_reader(reader);

        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            rows,
        })
    }

    pub fn from_path(path: &Path) -> BoqResult<Self> {
        let display = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| BoqError::file_io(display.clone(), e))?;
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        };
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("csv")
            .to_string();

        Self::from_reader(name, file, delimiter).map_err(|e| BoqError::csv(display, e))
    }

    fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

impl SheetSource for CsvSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn structured_rows(&self) -> Result<Vec<Vec<CellValue>>, SheetReadError> {
        Ok(self
            .rows
            .iter()
            .map(|record| record.iter().map(CellValue::from).collect())
            .collect())
    }

    fn records(&self) -> Result<Vec<Record>, SheetReadError> {
        records_from_rows(&self.structured_rows()?)
    }

    fn used_range(&self) -> Option<UsedRange> {
        let width = self.width();
        if self.rows.is_empty() || width == 0 {
            return None;
        }
        Some(UsedRange {
            start_row: 0,
            start_col: 0,
            end_row: self.rows.len() - 1,
            end_col: width - 1,
        })
    }

    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(CellValue::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::sheet::FallbackReader;
    use std::io::Write;

    #[test]
    fn test_ragged_csv_is_read() {
        let data = "Code,Description,Unit,Qty\n001,Concrete,m3,50\n002,Rebar\n";
        let sheet = CsvSheet::from_reader("boq", data.as_bytes(), b',').unwrap();
        let parsed = FallbackReader::new(&QualityConfig::default()).read_sheet(&sheet).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0][3], CellValue::Number(50.0));
        assert_eq!(parsed.report.inconsistent_rows, 1);
    }

    #[test]
    fn test_tsv_from_path() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        write!(file, "Unit\tQty\nm2\t4\n").unwrap();

        let sheet = CsvSheet::from_path(file.path()).unwrap();
        assert_eq!(sheet.cell(1, 1), CellValue::Text("4".to_string()));
        assert_eq!(sheet.used_range().unwrap().end_col, 1);
    }
}
