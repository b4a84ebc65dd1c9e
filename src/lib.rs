//! chonker-boq: bill-of-quantities extraction from PDF text layers and spreadsheets.
//!
//! PDF pages arrive as positioned text fragments and are rebuilt into tables by
//! [`layout`]; spreadsheets go through the fallback reader in [`sheet`]. Both paths
//! meet in [`mapping`] and [`materializer`], and finish in [`validation`] and
//! [`statistics`]. [`pipeline`] wires a whole document together.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod layout;
pub mod logging;
pub mod mapping;
pub mod materializer;
pub mod numerals;
pub mod pipeline;
pub mod sheet;
pub mod sources;
pub mod statistics;
pub mod text;
pub mod validation;

pub use config::BoqConfig;
pub use error::{BoqError, BoqResult, SectionWarning};
pub use layout::{ExtractedTable, ReconstructedRow, RowKind, TableReconstructor, TextFragment};
pub use mapping::{detect_column_mapping, find_column, CanonicalField, ColumnMapping, ColumnRef, SynonymTable};
pub use materializer::{map_pdf_data_to_items, BoqItem, ItemMaterializer};
pub use numerals::{normalize_numeral, parse_number_safe};
pub use pipeline::{
    process_documents_parallel, process_pdf, process_sheets, BoqExtraction, CancellationToken, DocumentInput,
    ExtractionOutcome, PipelineOptions,
};
pub use sheet::{CellGrid, CellValue, DataQualityReport, FallbackReader, SheetSource};
pub use statistics::{calculate_statistics, cost_distribution, group_by_category, identify_outliers};
pub use validation::{deduplicate_items, find_total_mismatches, sort_items, validate_items, ValidationResult};
