use serde::Serialize;

use super::CellValue;
use crate::config::QualityConfig;

/// Descriptive data-quality summary of one parsed sheet. Never blocks processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub missing_values: usize,
    pub data_type_issues: usize,
    pub inconsistent_rows: usize,
    pub suggestions: Vec<String>,
}

impl DataQualityReport {
    pub fn looks_good(&self) -> bool {
        self.suggestions.len() == 1 && self.suggestions[0] == GOOD_QUALITY
    }
}

pub const GOOD_QUALITY: &str = "Data quality looks good. No issues detected.";

/// Clean data rows in place of the raw ones and describe what was found.
///
/// Strings are trimmed, bare numerals become numbers and fully blank rows are removed
/// (counted as invalid). Column expectations come from the header width.
pub fn clean_rows(
    header_width: usize,
    rows: Vec<Vec<CellValue>>,
    config: &QualityConfig,
) -> (Vec<Vec<CellValue>>, DataQualityReport) {
    let mut report = DataQualityReport {
        total_rows: rows.len(),
        ..Default::default()
    };

    let mut cleaned = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_len = row.len();
        let row: Vec<CellValue> = row.into_iter().map(CellValue::cleaned).collect();

        if row.iter().all(CellValue::is_empty) {
            report.invalid_rows += 1;
            continue;
        }

        let effective_len = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
        if effective_len > header_width || raw_len < header_width {
            report.inconsistent_rows += 1;
        }

        report.missing_values += (0..header_width)
            .filter(|&i| row.get(i).map_or(true, CellValue::is_empty))
            .count();

        cleaned.push(row);
    }

    report.valid_rows = report.total_rows - report.invalid_rows;
    report.data_type_issues = count_type_issues(header_width, &cleaned);
    report.suggestions = suggestions(&report, header_width, config);

    (cleaned, report)
}

// Text sitting in a column whose values are mostly numeric
fn count_type_issues(width: usize, rows: &[Vec<CellValue>]) -> usize {
    (0..width)
        .map(|col| {
            let values: Vec<&CellValue> = rows
                .iter()
                .filter_map(|row| row.get(col))
                .filter(|cell| !cell.is_empty())
                .collect();
            let numeric = values.iter().filter(|cell| cell.is_number()).count();
            if numeric * 2 > values.len() {
                values.len() - numeric
            } else {
                0
            }
        })
        .sum()
}

fn suggestions(report: &DataQualityReport, header_width: usize, config: &QualityConfig) -> Vec<String> {
    let mut suggestions = Vec::new();

    let cell_count = report.valid_rows * header_width;
    if cell_count > 0 {
        let missing_ratio = report.missing_values as f64 / cell_count as f64;
        if missing_ratio > config.missing_ratio_threshold {
            suggestions.push(format!(
                "High percentage of missing values ({:.1}%). Fill in empty cells or check that columns are aligned with the header.",
                missing_ratio * 100.0
            ));
        }
    }

    if report.total_rows > 0 {
        let invalid_ratio = report.invalid_rows as f64 / report.total_rows as f64;
        if invalid_ratio > config.invalid_ratio_threshold {
            suggestions.push(format!(
                "Many rows are empty or unusable ({:.1}%). Remove blank separator rows and subtotal lines before importing.",
                invalid_ratio * 100.0
            ));
        }
    }

    if report.inconsistent_rows > 0 {
        suggestions.push(format!(
            "{} rows do not match the {} header columns. The sheet may contain merged cells or more than one table.",
            report.inconsistent_rows, header_width
        ));
    }

    if report.data_type_issues > 0 {
        suggestions.push(format!(
            "{} text values found in numeric columns. Check for units or notes typed into quantity and price cells.",
            report.data_type_issues
        ));
    }

    if suggestions.is_empty() {
        suggestions.push(GOOD_QUALITY.to_string());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_rows(rows: &[&[&str]]) -> Vec<Vec<CellValue>> {
        rows.iter()
            .map(|row| row.iter().map(|s| CellValue::from(*s)).collect())
            .collect()
    }

    #[test]
    fn test_clean_sheet_looks_good() {
        let rows = text_rows(&[&["001", "Concrete", "m3", "50"], &["002", "Rebar", "t", "2"]]);
        let (cleaned, report) = clean_rows(4, rows, &QualityConfig::default());

        assert_eq!(cleaned[0][3], CellValue::Number(50.0));
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.missing_values, 0);
        assert!(report.looks_good());
    }

    #[test]
    fn test_blank_rows_are_invalid() {
        let rows = text_rows(&[
            &["001", "Concrete", "m3", "50"],
            &["", " ", "", ""],
            &["002", "Rebar", "t", "2"],
        ]);
        let (cleaned, report) = clean_rows(4, rows, &QualityConfig::default());

        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(report.valid_rows, 2);
        assert!(report.suggestions.iter().any(|s| s.contains("empty or unusable")));
    }

    #[test]
    fn test_missing_values_and_ragged_rows() {
        let rows = text_rows(&[
            &["001", "", "", "50"],
            &["002", "Rebar", "", "2", "extra"],
            &["003", "Mesh"],
        ]);
        let (_, report) = clean_rows(4, rows, &QualityConfig::default());

        // 2 + 1 + 2 blanks inside the header width
        assert_eq!(report.missing_values, 5);
        assert_eq!(report.inconsistent_rows, 2);
        assert!(report.suggestions.iter().any(|s| s.contains("missing values")));
        assert!(report.suggestions.iter().any(|s| s.contains("do not match")));
        assert!(!report.looks_good());
    }

    #[test]
    fn test_text_in_numeric_column() {
        let rows = text_rows(&[&["10"], &["12"], &["approx 5"]]);
        let (_, report) = clean_rows(1, rows, &QualityConfig::default());
        assert_eq!(report.data_type_issues, 1);
    }
}
