use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};

use super::{PageError, TextFragment};
use crate::config::LayoutConfig;

/// Rows and column boundaries recovered from one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredPage {
    /// Top of page first
    pub rows: Vec<ClusteredRow>,
    /// Sorted X positions where columns start
    pub boundaries: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredRow {
    pub y: f64,
    pub cells: Vec<String>,
    pub columns: Vec<usize>,
}

/// Groups fragments into rows by Y bucket and into columns by X start position.
pub struct LayoutClusterer {
    row_tolerance: f64,
    column_merge_distance: f64,
}

impl LayoutClusterer {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            row_tolerance: config.row_tolerance,
            column_merge_distance: config.column_merge_distance,
        }
    }

    /// Returns `None` when the page has fewer than two column boundaries.
    pub fn cluster(&self, fragments: &[TextFragment]) -> Result<Option<ClusteredPage>, PageError> {
        if let Some(bad) = fragments.iter().find(|f| !f.x.is_finite() || !f.y.is_finite()) {
            return Err(PageError::NonFiniteCoordinate {
                text: bad.text.clone(),
                x: bad.x,
                y: bad.y,
            });
        }

        let fragments: Vec<&TextFragment> =
            fragments.iter().filter(|f| !f.text.trim().is_empty()).collect();

        let boundaries = self.column_boundaries(&fragments);
        if boundaries.len() < 2 {
            return Ok(None);
        }

        let rows = self
            .group_fragments_by_row(&fragments)
            .into_iter()
            .map(|(y, row)| self.assemble_row(y, &row, &boundaries))
            .collect();

        Ok(Some(ClusteredPage { rows, boundaries }))
    }

    fn group_fragments_by_row<'a>(
        &self,
        fragments: &[&'a TextFragment],
    ) -> Vec<(f64, Vec<&'a TextFragment>)> {
        let mut row_map: HashMap<OrderedFloat<f64>, Vec<&TextFragment>> = HashMap::new();

        for &fragment in fragments {
            let y_key = OrderedFloat((fragment.y / self.row_tolerance).round() * self.row_tolerance);
            row_map.entry(y_key).or_default().push(fragment);
        }

        let mut rows: Vec<(OrderedFloat<f64>, Vec<&TextFragment>)> = row_map.into_iter().collect();
        // PDF space grows upwards, so the top row has the largest Y
        rows.sort_by(|a, b| b.0.cmp(&a.0));

        rows.into_iter()
            .map(|(y, mut fragments)| {
                fragments.sort_by_key(|f| OrderedFloat(f.x));
                (y.0, fragments)
            })
            .collect()
    }

    fn column_boundaries(&self, fragments: &[&TextFragment]) -> Vec<f64> {
        let starts: BTreeSet<OrderedFloat<f64>> =
            fragments.iter().map(|f| OrderedFloat(f.x.round())).collect();

        let mut boundaries: Vec<f64> = Vec::with_capacity(starts.len());
        for start in starts {
            match boundaries.last() {
                Some(&last) if start.0 - last <= self.column_merge_distance => {}
                _ => boundaries.push(start.0),
            }
        }
        boundaries
    }

    fn assemble_row(&self, y: f64, fragments: &[&TextFragment], boundaries: &[f64]) -> ClusteredRow {
        let mut cells = Vec::new();
        let mut columns = Vec::new();
        let mut current: Option<(usize, String)> = None;

        for fragment in fragments {
            let x = fragment.x.round();
            let column = boundaries.partition_point(|&b| b <= x).saturating_sub(1);
            let text = fragment.text.trim();

            match current.as_mut() {
                Some((open_column, acc)) if *open_column == column => {
                    acc.push(' ');
                    acc.push_str(text);
                }
                _ => {
                    if let Some((open_column, acc)) = current.take() {
                        columns.push(open_column);
                        cells.push(acc);
                    }
                    current = Some((column, text.to_string()));
                }
            }
        }

        if let Some((open_column, acc)) = current {
            columns.push(open_column);
            cells.push(acc);
        }

        ClusteredRow { y, cells, columns }
    }
}
