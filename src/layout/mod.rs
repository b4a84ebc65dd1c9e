pub mod classifier;
pub mod clusterer;
pub mod confidence;

pub use classifier::RowClassifier;
pub use clusterer::{ClusteredPage, ClusteredRow, LayoutClusterer};
pub use confidence::score_table;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BoqConfig;

/// One positioned run of text from a PDF text layer. Y grows towards the top of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RowKind {
    Header,
    Section { level: u32 },
    Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedRow {
    /// Non-empty cell texts, left to right
    pub cells: Vec<String>,
    /// Column boundary index each cell started in, parallel to `cells`
    pub columns: Vec<usize>,
    pub kind: RowKind,
}

impl ReconstructedRow {
    /// Project this row's cells onto a header's column starts.
    ///
    /// A cell lands under the right-most header column that starts at or before it;
    /// cells left of the first header column land in the first one. Cells sharing a
    /// header column are joined with a space.
    pub fn project_onto(&self, anchors: &[usize]) -> Vec<String> {
        if anchors.is_empty() {
            return self.cells.clone();
        }
        let slots = self
            .columns
            .iter()
            .map(|&column| anchors.partition_point(|&a| a <= column).saturating_sub(1));
        self.fill_slots(slots, anchors.len())
    }

    /// Like `project_onto`, but against X positions, so rows can line up under a header
    /// from another page. `column_starts` are the X starts of this row's page columns.
    pub fn project_onto_positions(&self, column_starts: &[f64], anchors: &[f64]) -> Vec<String> {
        if anchors.is_empty() {
            return self.cells.clone();
        }
        let slots = self.columns.iter().map(|&column| {
            let x = column_starts.get(column).copied().unwrap_or(f64::NEG_INFINITY);
            anchors.partition_point(|&a| a <= x).saturating_sub(1)
        });
        self.fill_slots(slots, anchors.len())
    }

    fn fill_slots(&self, slots: impl Iterator<Item = usize>, width: usize) -> Vec<String> {
        let mut projected = vec![String::new(); width];
        for (cell, slot) in self.cells.iter().zip(slots) {
            let target = &mut projected[slot];
            if !target.is_empty() {
                target.push(' ');
            }
            target.push_str(cell);
        }
        projected
    }

    pub fn is_data(&self) -> bool {
        self.kind == RowKind::Data
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// Zero-based page index the table came from
    pub page: usize,
    pub headers: Vec<String>,
    /// Column boundary indices of the header cells; empty when no header was found
    pub header_columns: Vec<usize>,
    pub rows: Vec<ReconstructedRow>,
    pub column_count: usize,
    /// X start of each page column, indexed like `ReconstructedRow::columns`
    #[serde(default)]
    pub column_starts: Vec<f64>,
    pub confidence: u8,
}

impl ExtractedTable {
    pub fn has_header(&self) -> bool {
        !self.headers.is_empty()
    }

    /// Data rows aligned to the header when there is one, otherwise to every page column.
    /// Blank cells keep their slot either way.
    pub fn data_rows(&self) -> Vec<Vec<String>> {
        let page_columns: Vec<usize>;
        let anchors = if self.has_header() {
            &self.header_columns
        } else {
            page_columns = (0..self.column_count).collect();
            &page_columns
        };

        self.rows
            .iter()
            .filter(|row| row.is_data())
            .map(|row| row.project_onto(anchors))
            .collect()
    }

    /// X starts of the header cells, for aligning headerless pages that follow.
    pub fn header_starts(&self) -> Vec<f64> {
        self.header_columns
            .iter()
            .filter_map(|&column| self.column_starts.get(column).copied())
            .collect()
    }

    /// Data rows aligned to header X starts taken from an earlier page.
    pub fn data_rows_under(&self, anchors: &[f64]) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .filter(|row| row.is_data())
            .map(|row| row.project_onto_positions(&self.column_starts, anchors))
            .collect()
    }

    /// Treat the header row as data and drop the header, for a header that maps too little to trust.
    pub fn demote_header(&mut self) {
        for row in self.rows.iter_mut().filter(|row| row.kind == RowKind::Header) {
            row.kind = RowKind::Data;
        }
        self.headers.clear();
        self.header_columns.clear();
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_data()).count()
    }
}

/// A page that could not be reconstructed. The rest of the document is unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    #[error("fragment {text:?} has a non-finite position ({x}, {y})")]
    NonFiniteCoordinate { text: String, x: f64, y: f64 },
}

/// Rebuilds tables from the fragments of one page.
pub struct TableReconstructor {
    clusterer: LayoutClusterer,
    classifier: RowClassifier,
}

impl TableReconstructor {
    pub fn new(config: &BoqConfig) -> Self {
        Self {
            clusterer: LayoutClusterer::new(&config.layout),
            classifier: RowClassifier::new(&config.classifier),
        }
    }

    pub fn reconstruct_page(
        &self,
        page: usize,
        fragments: &[TextFragment],
    ) -> Result<Vec<ExtractedTable>, PageError> {
        let clustered = match self.clusterer.cluster(fragments)? {
            Some(clustered) => clustered,
            None => {
                tracing::debug!(page, fragments = fragments.len(), "No column structure on page");
                return Ok(Vec::new());
            }
        };

        let column_count = clustered.boundaries.len();
        let column_starts = clustered.boundaries;
        let rows = self.classifier.classify_rows(clustered.rows);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let (headers, header_columns) = rows
            .iter()
            .find(|row| row.kind == RowKind::Header)
            .map(|row| (row.cells.clone(), row.columns.clone()))
            .unwrap_or_default();

        let confidence = score_table(&rows);
        tracing::debug!(
            page,
            rows = rows.len(),
            columns = column_count,
            confidence,
            "Reconstructed table"
        );

        Ok(vec![ExtractedTable {
            page,
            headers,
            header_columns,
            rows,
            column_count,
            column_starts,
            confidence,
        }])
    }
}

/// Per-document reconstruction counters, surfaced in CLI summaries.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconstructionSummary {
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub tables_found: usize,
    pub data_rows: usize,
}

impl ReconstructionSummary {
    pub fn summary(&self) -> String {
        format!(
            "Processed {} pages ({} failed): {} tables, {} data rows.",
            self.pages_processed, self.pages_failed, self.tables_found, self.data_rows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment_grid(rows: &[(&[&str], f64)], xs: &[f64]) -> Vec<TextFragment> {
        rows.iter()
            .flat_map(|(cells, y)| {
                cells
                    .iter()
                    .zip(xs)
                    .filter(|(text, _)| !text.is_empty())
                    .map(move |(text, x)| TextFragment::new(*text, *x, *y))
            })
            .collect()
    }

    #[test]
    fn test_reconstructs_table_with_header() {
        let xs = [50.0, 120.0, 300.0, 360.0, 420.0, 500.0];
        let fragments = fragment_grid(
            &[
                (&["Code", "Description", "Unit", "Qty", "Rate", "Amount"], 700.0),
                (&["001", "Concrete", "m3", "50", "150", "7500"], 680.0),
                (&["002", "Rebar", "t", "2", "900", "1800"], 660.0),
            ],
            &xs,
        );

        let reconstructor = TableReconstructor::new(&BoqConfig::default());
        let tables = reconstructor.reconstruct_page(0, &fragments).unwrap();

        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.headers[1], "Description");
        assert_eq!(table.data_row_count(), 2);
        assert_eq!(table.data_rows()[1], vec!["002", "Rebar", "t", "2", "900", "1800"]);
        assert_eq!(table.confidence, 100);
    }

    #[test]
    fn test_single_column_page_yields_nothing() {
        let fragments = vec![
            TextFragment::new("Bill of Quantities", 72.0, 700.0),
            TextFragment::new("Project: Riyadh Metro", 72.0, 680.0),
        ];
        let reconstructor = TableReconstructor::new(&BoqConfig::default());
        assert!(reconstructor.reconstruct_page(0, &fragments).unwrap().is_empty());
    }

    #[test]
    fn test_blank_middle_cell_stays_under_its_header() {
        let xs = [50.0, 120.0, 300.0, 360.0];
        let fragments = fragment_grid(
            &[
                (&["Code", "Description", "Unit", "Quantity"], 700.0),
                (&["003", "Formwork", "", "12"], 680.0),
            ],
            &xs,
        );
        let reconstructor = TableReconstructor::new(&BoqConfig::default());
        let table = reconstructor.reconstruct_page(0, &fragments).unwrap().remove(0);

        assert_eq!(table.rows[1].cells, vec!["003", "Formwork", "12"]);
        assert_eq!(table.data_rows()[0], vec!["003", "Formwork", "", "12"]);
    }

    #[test]
    fn test_headerless_blank_cell_keeps_its_column() {
        let xs = [50.0, 120.0, 300.0, 360.0, 420.0, 500.0];
        let fragments = fragment_grid(
            &[
                (&["002", "Excavation", "m3", "300", "8", "2400"], 700.0),
                (&["003", "Sundries", "", "4", "25", "100"], 680.0),
            ],
            &xs,
        );
        let table = TableReconstructor::new(&BoqConfig::default())
            .reconstruct_page(1, &fragments)
            .unwrap()
            .remove(0);

        assert!(!table.has_header());
        assert_eq!(table.data_rows()[1], vec!["003", "Sundries", "", "4", "25", "100"]);
    }

    #[test]
    fn test_single_row_page_aligns_to_earlier_header() {
        let xs = [50.0, 120.0, 300.0, 360.0, 420.0, 500.0];
        let reconstructor = TableReconstructor::new(&BoqConfig::default());
        let first = reconstructor
            .reconstruct_page(0, &fragment_grid(&[(&["Code", "Description", "Unit", "Qty", "Rate", "Amount"], 700.0)], &xs))
            .unwrap()
            .remove(0);
        let continuation = reconstructor
            .reconstruct_page(1, &fragment_grid(&[(&["003", "Sundries", "", "4", "25", "100"], 700.0)], &xs))
            .unwrap()
            .remove(0);

        assert_eq!(continuation.column_count, 5);
        assert_eq!(
            continuation.data_rows_under(&first.header_starts()),
            vec![vec!["003", "Sundries", "", "4", "25", "100"]]
        );
    }

    #[test]
    fn test_demoted_header_becomes_data() {
        let xs = [50.0, 120.0, 300.0, 360.0];
        let fragments = fragment_grid(
            &[
                (&["No", "Unit heater", "", "3"], 700.0),
                (&["005", "Louvre", "m2", "6"], 680.0),
            ],
            &xs,
        );
        let mut table = TableReconstructor::new(&BoqConfig::default())
            .reconstruct_page(0, &fragments)
            .unwrap()
            .remove(0);
        assert!(table.has_header());

        table.demote_header();

        assert!(!table.has_header());
        assert_eq!(table.data_rows(), vec![vec!["No", "Unit heater", "", "3"], vec!["005", "Louvre", "m2", "6"]]);
    }

    #[test]
    fn test_non_finite_position_fails_page() {
        let fragments = vec![
            TextFragment::new("Code", 10.0, 700.0),
            TextFragment::new("Qty", f64::NAN, 700.0),
        ];
        let reconstructor = TableReconstructor::new(&BoqConfig::default());
        assert!(matches!(
            reconstructor.reconstruct_page(0, &fragments),
            Err(PageError::NonFiniteCoordinate { .. })
        ));
    }

    #[test]
    fn test_projection_joins_split_words() {
        let row = ReconstructedRow {
            cells: vec!["001".into(), "Ready".into(), "mix".into(), "5".into()],
            columns: vec![0, 1, 2, 4],
            kind: RowKind::Data,
        };
        assert_eq!(row.project_onto(&[0, 1, 4]), vec!["001", "Ready mix", "5"]);
    }
}
