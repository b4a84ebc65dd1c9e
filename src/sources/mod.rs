//! File adapters feeding the pipeline: PDF text-layer dumps, workbooks and CSV.
//!
//! This is the only part of the crate that touches the file system. Everything it
//! produces is plain data ([`TextFragment`] pages or [`SheetSource`] values).

pub mod csv_sheet;
pub mod fragments;
pub mod workbook;

pub use csv_sheet::CsvSheet;
pub use fragments::{load_pages, pages_from_json};
pub use workbook::{open_workbook_sheets, WorkbookSheet};

use std::path::Path;

use crate::error::{BoqError, BoqResult, SectionWarning};
use crate::sheet::SheetSource;

#[cfg(doc)]
use crate::layout::TextFragment;

pub type BoxedSheet = Box<dyn SheetSource + Send + Sync>;

/// What kind of document a path holds, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// JSON dump of positioned text fragments, one array per page
    PdfFragments,
    Workbook,
    Csv,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> BoqResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(SourceKind::PdfFragments),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Workbook),
            "csv" | "tsv" => Ok(SourceKind::Csv),
            _ => Err(BoqError::InvalidFormat {
                format: if extension.is_empty() {
                    path.display().to_string()
                } else {
                    extension
                },
            }),
        }
    }
}

/// Sheets that opened, plus warnings for the ones that did not.
#[derive(Default)]
pub struct LoadedSheets {
    pub sheets: Vec<BoxedSheet>,
    pub warnings: Vec<SectionWarning>,
}

/// Open every sheet of a workbook or CSV file.
pub fn open_sheet_sources(path: &Path) -> BoqResult<LoadedSheets> {
    match SourceKind::from_path(path)? {
        SourceKind::Workbook => {
            let (sheets, warnings) = open_workbook_sheets(path)?;
            if sheets.is_empty() && !warnings.is_empty() {
                return Err(BoqError::source_unreadable(format!(
                    "none of the {} sheets in {} could be read",
                    warnings.len(),
                    path.display()
                )));
            }
            Ok(LoadedSheets {
                sheets: sheets.into_iter().map(|s| Box::new(s) as BoxedSheet).collect(),
                warnings,
            })
        }
        SourceKind::Csv => Ok(LoadedSheets {
            sheets: vec![Box::new(CsvSheet::from_path(path)?)],
            warnings: Vec::new(),
        }),
        SourceKind::PdfFragments => Err(BoqError::InvalidFormat {
            format: "json (use the pdf command for fragment dumps)".to_string(),
        }),
    }
}
