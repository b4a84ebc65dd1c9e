use serde::Serialize;
use tracing::{debug, info, warn};

use super::quality::{clean_rows, DataQualityReport};
use super::{CellValue, Record, SheetReadError, SheetSource};
use crate::config::QualityConfig;
use crate::error::SectionWarning;

/// Parsing strategies, strictest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseStrategy {
    /// Row 0 is the header, every later row is positional data
    Structured,
    /// One keyed object per row, re-derived into positional rows
    Records,
    /// Cell-by-cell scan of the declared used range
    RawCellScan,
}

impl ParseStrategy {
    pub const ORDER: [ParseStrategy; 3] = [
        ParseStrategy::Structured,
        ParseStrategy::Records,
        ParseStrategy::RawCellScan,
    ];
}

/// Header plus positional rows, before cleaning.
#[derive(Debug, Clone, PartialEq)]
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

/// A sheet that one of the strategies could read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSheet {
    pub name: String,
    pub strategy: ParseStrategy,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub report: DataQualityReport,
}

impl ParsedSheet {
    /// Data rows keyed by header text.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                Record::new(
                    self.headers
                        .iter()
                        .enumerate()
                        .map(|(i, key)| (key.clone(), row.get(i).cloned().unwrap_or_default()))
                        .collect(),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkbookReadout {
    pub sheets: Vec<ParsedSheet>,
    pub warnings: Vec<SectionWarning>,
}

/// Tries each strategy in order and keeps the first that produces data.
pub struct FallbackReader {
    strategies: Vec<ParseStrategy>,
    quality: QualityConfig,
}

impl FallbackReader {
    pub fn new(quality: &QualityConfig) -> Self {
        Self {
            strategies: ParseStrategy::ORDER.to_vec(),
            quality: quality.clone(),
        }
    }

    /// Restrict or reorder the strategies, mainly for diagnostics.
    pub fn with_strategies(mut self, strategies: Vec<ParseStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn read_workbook(&self, sources: &[&dyn SheetSource]) -> WorkbookReadout {
        let mut readout = WorkbookReadout::default();

        for source in sources {
            match self.read_sheet(*source) {
                Ok(sheet) => readout.sheets.push(sheet),
                Err(warning) => {
                    crate::log_section_warning!(warning);
                    readout.warnings.push(warning);
                }
            }
        }

        info!(
            sheets = readout.sheets.len(),
            skipped = readout.warnings.len(),
            "📊 Workbook read"
        );
        readout
    }

    pub fn read_sheet(&self, source: &dyn SheetSource) -> Result<ParsedSheet, SectionWarning> {
        let mut failures = Vec::new();

        for &strategy in &self.strategies {
            match attempt(strategy, source) {
                Ok(Some(table)) => {
                    debug!(sheet = source.name(), ?strategy, rows = table.rows.len(), "Strategy succeeded");
                    if !failures.is_empty() {
                        warn!(sheet = source.name(), ?strategy, "Sheet needed a fallback strategy");
                    }
                    return Ok(self.finish(source.name(), strategy, table));
                }
                Ok(None) => {
                    debug!(sheet = source.name(), ?strategy, "Strategy found no data");
                    failures.push(format!("{:?}: no data", strategy));
                }
                Err(e) => {
                    debug!(sheet = source.name(), ?strategy, error = %e, "Strategy failed");
                    failures.push(format!("{:?}: {}", strategy, e));
                }
            }
        }

        Err(SectionWarning::new(
            format!("sheet {:?}", source.name()),
            format!("no parsing strategy produced rows ({})", failures.join("; ")),
        ))
    }

    fn finish(&self, name: &str, strategy: ParseStrategy, table: RawTable) -> ParsedSheet {
        let (rows, report) = clean_rows(table.headers.len(), table.rows, &self.quality);
        ParsedSheet {
            name: name.to_string(),
            strategy,
            headers: table.headers,
            rows,
            report,
        }
    }
}

fn attempt(strategy: ParseStrategy, source: &dyn SheetSource) -> Result<Option<RawTable>, SheetReadError> {
    match strategy {
        ParseStrategy::Structured => structured(source),
        ParseStrategy::Records => from_records(source),
        ParseStrategy::RawCellScan => raw_cell_scan(source),
    }
}

fn structured(source: &dyn SheetSource) -> Result<Option<RawTable>, SheetReadError> {
    let rows = source.structured_rows()?;
    let Some((header, data)) = rows.split_first() else {
        return Ok(None);
    };

    let headers = header_texts(header);
    if headers.iter().all(String::is_empty) {
        return Err(SheetReadError::Malformed("first row is not a header".to_string()));
    }

    Ok(with_data(headers, data.to_vec()))
}

fn from_records(source: &dyn SheetSource) -> Result<Option<RawTable>, SheetReadError> {
    let records = source.records()?;

    let mut headers: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.to_string());
            }
        }
    }

    let rows = records
        .iter()
        .filter(|record| !record.is_blank())
        .map(|record| {
            headers
                .iter()
                .map(|key| record.get(key).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(with_data(headers, rows))
}

fn raw_cell_scan(source: &dyn SheetSource) -> Result<Option<RawTable>, SheetReadError> {
    let range = source
        .used_range()
        .ok_or(SheetReadError::Unsupported("used-range"))?;

    let mut rows = (range.start_row..=range.end_row)
        .map(|r| {
            (range.start_col..=range.end_col)
                .map(|c| source.cell(r, c))
                .collect::<Vec<CellValue>>()
        })
        .filter(|row| !row.iter().all(CellValue::is_empty));

    let Some(header) = rows.next() else {
        return Ok(None);
    };
    Ok(with_data(header_texts(&header), rows.collect()))
}

fn header_texts(row: &[CellValue]) -> Vec<String> {
    let mut headers: Vec<String> = row.iter().map(|c| c.as_text().trim().to_string()).collect();
    while headers.last().is_some_and(String::is_empty) {
        headers.pop();
    }
    headers
}

fn with_data(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Option<RawTable> {
    let has_data = rows.iter().any(|row| row.iter().any(|c| !c.is_empty()));
    if headers.is_empty() || !has_data {
        return None;
    }
    Some(RawTable { headers, rows })
}
