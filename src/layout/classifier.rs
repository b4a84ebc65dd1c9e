use once_cell::sync::Lazy;
use regex::Regex;

use super::{ClusteredRow, ReconstructedRow, RowKind};
use crate::config::ClassifierConfig;
use crate::numerals::{is_plain_number, normalize_numeral};
use crate::text::fold_case;

/// Substrings that mark a header row, Latin and Arabic.
pub const DEFAULT_HEADER_KEYWORDS: &[&str] = &[
    "item",
    "description",
    "unit",
    "quantity",
    "price",
    "total",
    "code",
    "البند",
    "الوصف",
    "البيان",
    "الوحدة",
    "وحدة",
    "الكمية",
    "كمية",
    "السعر",
    "سعر",
    "الاجمالي",
    "المجموع",
    "الرمز",
];

/// Short labels that only count as a whole word, so `rate` does not fire on `separate`.
pub const DEFAULT_HEADER_TOKENS: &[&str] = &["qty", "rate", "amount"];

static DIVISION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:division|section|القسم|الباب)\s+(\d+(?:\.\d+)*)").expect("division pattern")
});

static OUTLINE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)*)\.?\s*[-–—]").expect("outline pattern"));

// CSI MasterFormat style `03 30 00`
static MASTERFORMAT_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-4]\d) (\d{2}) (\d{2})(?:\s|$)").expect("masterformat pattern"));

/// Labels reconstructed rows as header, section heading or data.
pub struct RowClassifier {
    header_keywords: Vec<String>,
    header_tokens: Vec<String>,
}

impl RowClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            header_keywords: config
                .header_keywords
                .iter()
                .map(|k| fold_case(k.trim()))
                .filter(|k| !k.is_empty())
                .collect(),
            header_tokens: config
                .header_tokens
                .iter()
                .map(|k| fold_case(k.trim()))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_header_row(&self, cells: &[String]) -> bool {
        cells.iter().any(|cell| {
            let folded = fold_case(cell);
            self.header_keywords.iter().any(|keyword| folded.contains(keyword.as_str()))
                || folded
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| self.header_tokens.iter().any(|token| token == word))
        })
    }

    /// A keyword row can only latch as the header when most of its cells are not numbers.
    /// `Air handling unit | No | 2 | 45000` is a data row.
    fn accepts_header(&self, cells: &[String]) -> bool {
        let numeric = cells.iter().filter(|cell| is_plain_number(cell)).count();
        self.is_header_row(cells) && numeric * 2 < cells.len()
    }

    pub fn is_section_row(&self, cells: &[String]) -> bool {
        self.section_level(cells).is_some()
    }

    /// Nesting level of a section heading, or `None` for anything else.
    pub fn section_level(&self, cells: &[String]) -> Option<u32> {
        let first = normalize_numeral(cells.first()?);

        if let Some(caps) = DIVISION_HEADING.captures(&first) {
            return Some(dotted_depth(&caps[1]));
        }
        if let Some(caps) = OUTLINE_HEADING.captures(&first) {
            return Some(dotted_depth(&caps[1]));
        }
        if let Some(caps) = MASTERFORMAT_HEADING.captures(&first) {
            let depth = (2..=3).filter(|&i| &caps[i] != "00").count() as u32;
            return Some(depth + 1);
        }
        None
    }

    /// Classify a page's rows top to bottom. Only the first header-like row is a header.
    pub fn classify_rows(&self, rows: Vec<ClusteredRow>) -> Vec<ReconstructedRow> {
        let mut header_latched = false;

        rows.into_iter()
            .map(|row| {
                let kind = if !header_latched && self.accepts_header(&row.cells) {
                    header_latched = true;
                    RowKind::Header
                } else if let Some(level) = self.section_level(&row.cells) {
                    RowKind::Section { level }
                } else {
                    RowKind::Data
                };

                ReconstructedRow {
                    cells: row.cells,
                    columns: row.columns,
                    kind,
                }
            })
            .collect()
    }
}

fn dotted_depth(outline: &str) -> u32 {
    outline.split('.').filter(|part| !part.is_empty()).count().max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RowClassifier {
        RowClassifier::new(&ClassifierConfig::default())
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn row(values: &[&str]) -> ClusteredRow {
        ClusteredRow {
            y: 0.0,
            cells: cells(values),
            columns: (0..values.len()).collect(),
        }
    }

    #[test]
    fn test_english_header() {
        assert!(classifier().is_header_row(&cells(&["No.", "DESCRIPTION", "Unit"])));
        assert!(!classifier().is_header_row(&cells(&["001", "Concrete", "m3"])));
    }

    #[test]
    fn test_short_labels_match_whole_words() {
        let c = classifier();
        assert!(c.is_header_row(&cells(&["No.", "Works", "Qty", "Rate"])));
        assert!(!c.is_header_row(&cells(&["A-7", "Separate accurate drainage", "m"])));
        assert!(!c.is_header_row(&cells(&["12", "نقل المخلفات رقم 3", "م"])));
    }

    #[test]
    fn test_numeric_keyword_row_stays_data() {
        let rows = classifier().classify_rows(vec![
            row(&["002", "Air handling unit", "No", "2", "45000", "90000"]),
            row(&["003", "Ductwork", "m", "40", "25", "1000"]),
        ]);

        assert!(rows.iter().all(|r| r.kind == RowKind::Data));
    }

    #[test]
    fn test_arabic_header() {
        assert!(classifier().is_header_row(&cells(&["م", "الوصف", "الكمية"])));
        assert!(classifier().is_header_row(&cells(&["الإجمالي"])));
    }

    #[test]
    fn test_section_patterns() {
        let c = classifier();
        assert_eq!(c.section_level(&cells(&["DIVISION 03", "Concrete"])), Some(1));
        assert_eq!(c.section_level(&cells(&["Section 2.1"])), Some(2));
        assert_eq!(c.section_level(&cells(&["1.2.3 - Excavation"])), Some(3));
        assert_eq!(c.section_level(&cells(&["03 30 00 Cast-in-place"])), Some(2));
        assert_eq!(c.section_level(&cells(&["٢ - أعمال الخرسانة"])), Some(1));
        assert_eq!(c.section_level(&cells(&["001", "Concrete"])), None);
        assert_eq!(c.section_level(&[]), None);

        assert!(c.is_section_row(&cells(&["القسم 4", "أعمال الحديد"])));
        assert!(!c.is_section_row(&cells(&["Concrete", "m3", "50"])));
    }

    #[test]
    fn test_first_header_wins() {
        let rows = classifier().classify_rows(vec![
            row(&["Item", "Description", "Qty"]),
            row(&["1 - Earthworks"]),
            row(&["001", "Excavation", "120"]),
            row(&["Item", "Description", "Qty"]),
        ]);

        let kinds: Vec<RowKind> = rows.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RowKind::Header,
                RowKind::Section { level: 1 },
                RowKind::Data,
                RowKind::Data
            ]
        );
    }
}
