use std::collections::HashMap;

use super::{ReconstructedRow, RowKind};

const HEADER_WEIGHT: f64 = 30.0;
const CONSISTENCY_WEIGHT: f64 = 40.0;
const DATA_WEIGHT: f64 = 30.0;

/// Advisory 0-100 score of how table-like a set of rows is. Never used as a gate.
pub fn score_table(rows: &[ReconstructedRow]) -> u8 {
    if rows.is_empty() {
        return 0;
    }

    let mut score = 0.0;

    if rows.iter().any(|row| row.kind == RowKind::Header) {
        score += HEADER_WEIGHT;
    }

    let modal = modal_cell_count(rows);
    let deviating = rows.iter().filter(|row| row.cells.len() != modal).count();
    score += CONSISTENCY_WEIGHT * (1.0 - deviating as f64 / rows.len() as f64);

    if rows.iter().any(|row| row.kind == RowKind::Data) {
        score += DATA_WEIGHT;
    }

    score.round().clamp(0.0, 100.0) as u8
}

// Ties go to the wider row shape
fn modal_cell_count(rows: &[ReconstructedRow]) -> usize {
    let mut count_frequency: HashMap<usize, usize> = HashMap::new();
    for row in rows {
        *count_frequency.entry(row.cells.len()).or_insert(0) += 1;
    }

    count_frequency
        .into_iter()
        .max_by_key(|&(count, freq)| (freq, count))
        .map(|(count, _)| count)
        .unwrap_or(0)
}
