//! Document-level orchestration.
//!
//! One call processes one document end to end (reconstruct or read, map, materialise,
//! validate). Each call owns its own item-code sequence and shares nothing with other
//! calls, so documents can be processed concurrently with identical results.

use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BoqConfig;
use crate::error::{BoqError, BoqResult, SectionWarning};
use crate::layout::{ExtractedTable, ReconstructionSummary, TableReconstructor, TextFragment};
use crate::logging::PerformanceTimer;
use crate::mapping::{detect_column_mapping, detect_key_mapping, CanonicalField, ColumnMapping, SynonymTable};
use crate::materializer::{BoqItem, ItemMaterializer};
use crate::sheet::{DataQualityReport, FallbackReader, ParseStrategy, SheetSource};
use crate::sources::BoxedSheet;
use crate::statistics::{calculate_statistics, ItemStatistics};
use crate::validation::{find_total_mismatches, TotalMismatch, ValidationResult, Validator};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub config: BoqConfig,
    /// Caller-supplied columns; they replace detected columns for the same field
    pub mapping_override: Option<ColumnMapping>,
    pub keep_invalid: bool,
}

/// Cooperative cancellation, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    /// One-based number of the page just finished
    pub page: usize,
    pub total_pages: usize,
    pub tables_found: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub tables: Vec<ExtractedTable>,
    pub warnings: Vec<SectionWarning>,
    pub summary: ReconstructionSummary,
    pub cancelled: bool,
}

/// Page-by-page table reconstruction for one PDF.
pub struct PdfPipeline {
    reconstructor: TableReconstructor,
}

impl PdfPipeline {
    pub fn new(config: &BoqConfig) -> Self {
        Self {
            reconstructor: TableReconstructor::new(config),
        }
    }

    /// Reconstruct every page, reporting progress after each one.
    ///
    /// A failed page becomes a warning. Cancellation stops before the next page and
    /// keeps the tables already found.
    pub fn extract_pages(
        &self,
        pages: &[Vec<TextFragment>],
        mut progress: impl FnMut(PageProgress),
        cancel: &CancellationToken,
    ) -> PageExtraction {
        let mut extraction = PageExtraction::default();

        for (index, fragments) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(done = index, total = pages.len(), "🛑 Extraction cancelled");
                extraction.cancelled = true;
                break;
            }

            extraction.summary.pages_processed += 1;
            match self.reconstructor.reconstruct_page(index, fragments) {
                Ok(tables) => {
                    extraction.summary.tables_found += tables.len();
                    extraction.summary.data_rows += tables.iter().map(ExtractedTable::data_row_count).sum::<usize>();
                    extraction.tables.extend(tables);
                }
                Err(e) => {
                    let warning = SectionWarning::new(format!("page {}", index + 1), e.to_string());
                    crate::log_section_warning!(warning);
                    extraction.summary.pages_failed += 1;
                    extraction.warnings.push(warning);
                }
            }

            progress(PageProgress {
                page: index + 1,
                total_pages: pages.len(),
                tables_found: extraction.tables.len(),
            });
        }

        debug!("{}", extraction.summary.summary());
        extraction
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMapping {
    pub section: String,
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetQuality {
    pub sheet: String,
    pub strategy: ParseStrategy,
    pub report: DataQualityReport,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoqExtraction {
    pub source_name: String,
    pub tables: Vec<ExtractedTable>,
    pub quality: Vec<SheetQuality>,
    pub mappings: Vec<SectionMapping>,
    pub validation: ValidationResult,
    pub dropped_rows: usize,
    pub total_mismatches: Vec<TotalMismatch>,
    pub statistics: ItemStatistics,
    pub warnings: Vec<SectionWarning>,
    pub cancelled: bool,
    #[serde(skip)]
    keep_invalid: bool,
}

impl BoqExtraction {
    /// Final item list: valid items, plus invalid ones if the caller asked to keep them.
    pub fn items(&self) -> Vec<BoqItem> {
        self.validation.clone().into_items(self.keep_invalid)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExtractionOutcome {
    Extracted(BoqExtraction),
    /// No header could be mapped; the caller should supply a column mapping
    #[serde(rename_all = "camelCase")]
    NeedsManualMapping {
        source_name: String,
        headers: Vec<String>,
        tables: Vec<ExtractedTable>,
        warnings: Vec<SectionWarning>,
    },
}

impl ExtractionOutcome {
    pub fn extraction(&self) -> Option<&BoqExtraction> {
        match self {
            ExtractionOutcome::Extracted(extraction) => Some(extraction),
            ExtractionOutcome::NeedsManualMapping { .. } => None,
        }
    }

    pub fn warnings(&self) -> &[SectionWarning] {
        match self {
            ExtractionOutcome::Extracted(extraction) => &extraction.warnings,
            ExtractionOutcome::NeedsManualMapping { warnings, .. } => warnings,
        }
    }

    /// Put warnings raised while opening the source ahead of the extraction's own.
    pub fn prepend_warnings(&mut self, earlier: Vec<SectionWarning>) {
        let warnings = match self {
            ExtractionOutcome::Extracted(extraction) => &mut extraction.warnings,
            ExtractionOutcome::NeedsManualMapping { warnings, .. } => warnings,
        };
        warnings.splice(0..0, earlier);
    }
}

/// What one document produced before validation.
#[derive(Default)]
struct Collected {
    items: Vec<BoqItem>,
    dropped_rows: usize,
    tables: Vec<ExtractedTable>,
    quality: Vec<SheetQuality>,
    mappings: Vec<SectionMapping>,
    warnings: Vec<SectionWarning>,
    cancelled: bool,
}

impl Collected {
    fn finish(self, source_name: &str, options: &PipelineOptions) -> ExtractionOutcome {
        let validation = Validator::new(&options.config.validation).run(self.items);
        let total_mismatches =
            find_total_mismatches(&validation.valid, options.config.validation.total_mismatch_tolerance);
        if !total_mismatches.is_empty() {
            warn!(
                source = source_name,
                count = total_mismatches.len(),
                "Stated totals differ from quantity × unit price"
            );
        }
        let statistics = calculate_statistics(&validation.valid);

        info!(
            source = source_name,
            valid = validation.valid.len(),
            invalid = validation.invalid.len(),
            dropped = self.dropped_rows,
            warnings = self.warnings.len(),
            "🐹 Document processed"
        );

        ExtractionOutcome::Extracted(BoqExtraction {
            source_name: source_name.to_string(),
            tables: self.tables,
            quality: self.quality,
            mappings: self.mappings,
            validation,
            dropped_rows: self.dropped_rows,
            total_mismatches,
            statistics,
            warnings: self.warnings,
            cancelled: self.cancelled,
            keep_invalid: options.keep_invalid,
        })
    }
}

fn apply_override(detected: Option<ColumnMapping>, options: &PipelineOptions) -> Option<ColumnMapping> {
    match (detected, &options.mapping_override) {
        (Some(detected), Some(overrides)) => Some(detected.overridden_by(overrides)),
        (None, Some(overrides)) => Some(overrides.clone()),
        (detected, None) => detected,
    }
}

/// A newly detected header replaces the running one only when it maps at least as much,
/// or on its own carries a description and a quantity.
fn supersedes(detected: &ColumnMapping, previous: &ColumnMapping) -> bool {
    detected.len() >= previous.len()
        || (detected.contains(CanonicalField::Description) && detected.contains(CanonicalField::Quantity))
}

/// Process the text-layer pages of one PDF.
pub fn process_pdf(
    source_name: &str,
    pages: &[Vec<TextFragment>],
    options: &PipelineOptions,
) -> BoqResult<ExtractionOutcome> {
    process_pdf_with_progress(source_name, pages, options, |_| {}, &CancellationToken::new())
}

pub fn process_pdf_with_progress(
    source_name: &str,
    pages: &[Vec<TextFragment>],
    options: &PipelineOptions,
    progress: impl FnMut(PageProgress),
    cancel: &CancellationToken,
) -> BoqResult<ExtractionOutcome> {
    let timer = PerformanceTimer::start(format!("PDF extraction of {}", source_name));
    let config = &options.config;
    let synonyms = SynonymTable::from_config(&config.mapping)?;

    let mut extraction = PdfPipeline::new(config).extract_pages(pages, progress, cancel);
    timer.checkpoint("pages reconstructed");
    if extraction.tables.is_empty() {
        return Err(BoqError::NoUsableData {
            source_name: source_name.to_string(),
            warnings: extraction.warnings.len(),
        });
    }

    let mut materializer = ItemMaterializer::new(&config.materialize);
    let mut collected = Collected::default();
    let mut previous: Option<ColumnMapping> = None;
    let mut previous_starts: Vec<f64> = Vec::new();

    for table in &mut extraction.tables {
        // Continuation pages without a header reuse the last header seen
        let mut detected = if table.has_header() {
            detect_column_mapping(&table.headers, &synonyms)
        } else {
            None
        };
        let weaker = matches!((&detected, &previous), (Some(found), Some(kept)) if !supersedes(found, kept));
        if weaker {
            debug!(
                page = table.page + 1,
                headers = ?table.headers,
                "Header maps fewer fields than the previous page, reading it as data"
            );
            table.demote_header();
            detected = None;
        }
        if detected.is_some() {
            previous = detected.clone();
            previous_starts = table.header_starts();
        }

        let Some(mapping) = apply_override(detected.or_else(|| previous.clone()), options) else {
            debug!(page = table.page + 1, headers = ?table.headers, "No column mapping for table");
            continue;
        };

        // Continuation rows line up under the running header by X position
        let rows = if table.has_header() || previous_starts.is_empty() {
            table.data_rows()
        } else {
            table.data_rows_under(&previous_starts)
        };
        let outcome = materializer.materialize(&rows, &mapping);
        collected.dropped_rows += outcome.dropped;
        collected.items.extend(outcome.items);
        collected.mappings.push(SectionMapping {
            section: format!("page {}", table.page + 1),
            mapping,
        });
    }

    if collected.mappings.is_empty() {
        warn!(source = source_name, "No table header could be mapped");
        return Ok(ExtractionOutcome::NeedsManualMapping {
            source_name: source_name.to_string(),
            headers: extraction
                .tables
                .iter()
                .find(|t| t.has_header())
                .map(|t| t.headers.clone())
                .unwrap_or_default(),
            tables: extraction.tables,
            warnings: extraction.warnings,
        });
    }

    collected.tables = extraction.tables;
    collected.warnings = extraction.warnings;
    collected.cancelled = extraction.cancelled;
    Ok(collected.finish(source_name, options))
}

/// Process the sheets of one workbook or CSV file.
pub fn process_sheets(
    source_name: &str,
    sources: &[&dyn SheetSource],
    options: &PipelineOptions,
) -> BoqResult<ExtractionOutcome> {
    let _timer = PerformanceTimer::start(format!("sheet extraction of {}", source_name));
    let config = &options.config;
    let synonyms = SynonymTable::from_config(&config.mapping)?;

    let readout = FallbackReader::new(&config.quality).read_workbook(sources);
    if readout.sheets.is_empty() {
        return Err(BoqError::NoUsableData {
            source_name: source_name.to_string(),
            warnings: readout.warnings.len(),
        });
    }

    let mut materializer = ItemMaterializer::new(&config.materialize).with_row_lookup(synonyms.clone());
    let mut collected = Collected::default();

    for sheet in &readout.sheets {
        collected.quality.push(SheetQuality {
            sheet: sheet.name.clone(),
            strategy: sheet.strategy,
            report: sheet.report.clone(),
        });

        let Some(mapping) = apply_override(detect_key_mapping(&sheet.headers, &synonyms), options) else {
            debug!(sheet = %sheet.name, headers = ?sheet.headers, "No column mapping for sheet");
            continue;
        };

        let outcome = materializer.materialize(&sheet.records(), &mapping);
        collected.dropped_rows += outcome.dropped;
        collected.items.extend(outcome.items);
        collected.mappings.push(SectionMapping {
            section: format!("sheet {:?}", sheet.name),
            mapping,
        });
    }

    if collected.mappings.is_empty() {
        warn!(source = source_name, "No sheet header could be mapped");
        return Ok(ExtractionOutcome::NeedsManualMapping {
            source_name: source_name.to_string(),
            headers: readout.sheets[0].headers.clone(),
            tables: Vec::new(),
            warnings: readout.warnings,
        });
    }

    collected.warnings = readout.warnings;
    Ok(collected.finish(source_name, options))
}

/// One independent document for batch processing.
pub enum DocumentInput {
    Pdf {
        name: String,
        pages: Vec<Vec<TextFragment>>,
    },
    Sheets {
        name: String,
        sheets: Vec<BoxedSheet>,
    },
}

impl DocumentInput {
    pub fn name(&self) -> &str {
        match self {
            DocumentInput::Pdf { name, .. } | DocumentInput::Sheets { name, .. } => name,
        }
    }

    pub fn process(&self, options: &PipelineOptions) -> BoqResult<ExtractionOutcome> {
        match self {
            DocumentInput::Pdf { name, pages } => process_pdf(name, pages, options),
            DocumentInput::Sheets { name, sheets } => {
                let sources: Vec<&dyn SheetSource> = sheets.iter().map(|s| &**s as &dyn SheetSource).collect();
                process_sheets(name, &sources, options)
            }
        }
    }
}

/// Process independent documents on the rayon pool. Results keep input order.
pub fn process_documents_parallel(
    inputs: &[DocumentInput],
    options: &PipelineOptions,
) -> Vec<BoqResult<ExtractionOutcome>> {
    info!(documents = inputs.len(), "🚀 Processing documents in parallel");
    inputs
        .par_iter()
        .map(|input| {
            let result = input.process(options);
            if let Err(e) = &result {
                crate::log_error!(e, input.name());
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{CanonicalField, ColumnRef};
    use crate::sheet::CellGrid;

    const XS: [f64; 6] = [50.0, 120.0, 300.0, 360.0, 420.0, 500.0];

    fn page(rows: &[&[&str]], top: f64) -> Vec<TextFragment> {
        rows.iter()
            .enumerate()
            .flat_map(|(r, cells)| {
                let y = top - 20.0 * r as f64;
                cells
                    .iter()
                    .zip(XS)
                    .filter(|(text, _)| !text.is_empty())
                    .map(move |(text, x)| TextFragment::new(*text, x, y))
            })
            .collect()
    }

    fn boq_page() -> Vec<TextFragment> {
        page(
            &[
                &["Code", "Description", "Unit", "Qty", "Rate", "Amount"],
                &["001", "Concrete", "m3", "50", "150", "7500"],
                &["002", "Rebar", "t", "2", "900", "1800"],
            ],
            700.0,
        )
    }

    #[test]
    fn test_pdf_end_to_end() {
        let outcome = process_pdf("boq.pdf", &[boq_page()], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();

        assert_eq!(extraction.validation.valid.len(), 2);
        assert_eq!(extraction.items()[0].total_price, 7500.0);
        assert_eq!(extraction.statistics.total_cost, 9300.0);
        assert!(extraction.total_mismatches.is_empty());
    }

    #[test]
    fn test_headerless_continuation_page_reuses_mapping() {
        let continuation = page(&[&["003", "Formwork", "m2", "10", "20", "200"]], 700.0);
        let outcome = process_pdf("boq.pdf", &[boq_page(), continuation], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();

        assert_eq!(extraction.validation.valid.len(), 3);
        assert_eq!(extraction.mappings.len(), 2);
    }

    #[test]
    fn test_continuation_blank_unit_keeps_columns() {
        let continuation = page(&[&["003", "Sundries", "", "4", "25", "100"]], 700.0);
        let outcome = process_pdf("boq.pdf", &[boq_page(), continuation], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();
        let items = extraction.items();

        assert_eq!(items.len(), 3);
        let sundries = &items[2];
        assert_eq!(sundries.item_code, "003");
        assert_eq!(sundries.description, "Sundries");
        assert_eq!(sundries.unit, "LOT");
        assert_eq!(sundries.quantity, 4.0);
        assert_eq!(sundries.unit_price, 25.0);
        assert_eq!(sundries.total_price, 100.0);
        assert_eq!(extraction.statistics.total_cost, 9400.0);
    }

    #[test]
    fn test_continuation_row_with_header_words_is_data() {
        let continuation = page(
            &[
                &["003", "Air handling unit", "No", "2", "45000", "90000"],
                &["004", "Ductwork", "m", "40", "25", "1000"],
            ],
            700.0,
        );
        let outcome = process_pdf("boq.pdf", &[boq_page(), continuation], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();
        let items = extraction.items();

        assert_eq!(items.len(), 4);
        assert_eq!(extraction.dropped_rows, 0);
        assert_eq!(items[2].item_code, "003");
        assert_eq!(items[2].description, "Air handling unit");
        assert_eq!(items[2].unit, "No");
        assert_eq!(items[2].quantity, 2.0);
        assert_eq!(items[2].unit_price, 45000.0);
        assert_eq!(items[2].total_price, 90000.0);
        assert_eq!(items[3].description, "Ductwork");
        assert_eq!(items[3].quantity, 40.0);
        assert_eq!(items[3].total_price, 1000.0);
        assert_eq!(extraction.mappings[1].mapping, extraction.mappings[0].mapping);
    }

    #[test]
    fn test_weak_header_does_not_replace_previous_mapping() {
        let continuation = page(
            &[
                &["", "Unit heater", "No", "3", "1,200", "3,600"],
                &["005", "Louvre", "m2", "6", "150", "900"],
            ],
            700.0,
        );
        let outcome = process_pdf("boq.pdf", &[boq_page(), continuation], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();
        let items = extraction.items();

        assert!(!extraction.tables[1].has_header());
        assert_eq!(extraction.dropped_rows, 0);
        assert_eq!(items.len(), 4);
        assert_eq!(items[2].description, "Unit heater");
        assert_eq!(items[2].unit, "No");
        assert_eq!(items[2].quantity, 3.0);
        assert_eq!(items[2].unit_price, 1200.0);
        assert_eq!(items[2].total_price, 3600.0);
        assert_eq!(items[3].item_code, "005");
        assert_eq!(items[3].quantity, 6.0);
    }

    #[test]
    fn test_strong_header_replaces_previous_mapping() {
        let previous = ColumnMapping::from_indices([
            (CanonicalField::ItemCode, 0),
            (CanonicalField::Description, 1),
            (CanonicalField::Unit, 2),
            (CanonicalField::Quantity, 3),
        ]);
        let narrower = ColumnMapping::from_indices([(CanonicalField::Description, 0), (CanonicalField::Quantity, 1)]);
        let code_only = ColumnMapping::from_indices([(CanonicalField::ItemCode, 2)]);

        assert!(supersedes(&narrower, &previous));
        assert!(!supersedes(&code_only, &previous));
        assert!(supersedes(&previous, &code_only));
    }

    #[test]
    fn test_failed_page_is_isolated() {
        let mut broken = boq_page();
        broken[0].x = f64::INFINITY;
        let outcome = process_pdf("boq.pdf", &[broken, boq_page()], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();

        assert_eq!(extraction.warnings.len(), 1);
        assert_eq!(extraction.warnings[0].section, "page 1");
        assert_eq!(extraction.validation.valid.len(), 2);
    }

    #[test]
    fn test_no_tables_is_document_error() {
        let prose = vec![TextFragment::new("Bill of Quantities", 72.0, 700.0)];
        assert!(matches!(
            process_pdf("cover.pdf", &[prose], &PipelineOptions::default()),
            Err(BoqError::NoUsableData { .. })
        ));
    }

    #[test]
    fn test_unmapped_headers_need_manual_mapping() {
        let pages = [page(&[&["Alpha", "Beta"], &["x", "1"], &["y", "2"]], 700.0)];
        let outcome = process_pdf("odd.pdf", &pages, &PipelineOptions::default()).unwrap();
        assert!(matches!(outcome, ExtractionOutcome::NeedsManualMapping { .. }));

        let options = PipelineOptions {
            mapping_override: Some(ColumnMapping::from_indices([
                (CanonicalField::Description, 0),
                (CanonicalField::Quantity, 1),
            ])),
            ..Default::default()
        };
        let outcome = process_pdf("odd.pdf", &pages, &options).unwrap();
        assert_eq!(outcome.extraction().unwrap().validation.valid.len(), 2);
    }

    #[test]
    fn test_open_warnings_reach_manual_mapping_outcome() {
        let pages = [page(&[&["Alpha", "Beta"], &["x", "1"]], 700.0)];
        let mut outcome = process_pdf("odd.pdf", &pages, &PipelineOptions::default()).unwrap();

        outcome.prepend_warnings(vec![SectionWarning::new("sheet \"Old\"", "unreadable")]);

        assert!(matches!(outcome, ExtractionOutcome::NeedsManualMapping { .. }));
        assert_eq!(outcome.warnings().len(), 1);
        assert_eq!(outcome.warnings()[0].section, "sheet \"Old\"");
    }

    #[test]
    fn test_open_warnings_come_first() {
        let mut broken = boq_page();
        broken[0].x = f64::NAN;
        let mut outcome = process_pdf("boq.pdf", &[broken, boq_page()], &PipelineOptions::default()).unwrap();

        outcome.prepend_warnings(vec![SectionWarning::new("sheet \"Old\"", "unreadable")]);

        let sections: Vec<&str> = outcome.warnings().iter().map(|w| w.section.as_str()).collect();
        assert_eq!(sections, vec!["sheet \"Old\"", "page 1"]);
    }

    #[test]
    fn test_cancellation_keeps_finished_pages() {
        let cancel = CancellationToken::new();
        let pages = vec![boq_page(), boq_page(), boq_page()];
        let mut seen = Vec::new();

        let extraction = PdfPipeline::new(&BoqConfig::default()).extract_pages(
            &pages,
            |p| {
                seen.push(p.page);
                if p.page == 2 {
                    cancel.cancel();
                }
            },
            &cancel,
        );

        assert!(extraction.cancelled);
        assert_eq!(extraction.tables.len(), 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_sheets_end_to_end() {
        let grid = CellGrid::from_strings(
            "Civil",
            [
                vec!["رقم البند", "الوصف", "الوحدة", "الكمية", "سعر الوحدة"],
                vec!["١", "خرسانة", "م٣", "٥٠", "١٥٠"],
                vec!["", "", "", "", ""],
            ],
        );
        let outcome = process_sheets("civil.xlsx", &[&grid], &PipelineOptions::default()).unwrap();
        let extraction = outcome.extraction().unwrap();

        assert_eq!(extraction.quality[0].report.invalid_rows, 1);
        assert_eq!(extraction.validation.valid[0].total_price, 7500.0);
        assert_eq!(
            extraction.mappings[0].mapping.get(CanonicalField::Unit),
            Some(&ColumnRef::Key("الوحدة".to_string()))
        );
    }
}
