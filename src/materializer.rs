//! Mapped rows to canonical BOQ items.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MaterializeConfig;
use crate::mapping::{find_column, CanonicalField, ColumnMapping, ColumnRef, SynonymTable};
use crate::numerals::{normalize_numeral, parse_number_safe};
use crate::sheet::{CellValue, Record};

pub const NO_DESCRIPTION: &str = "No description";

// 9 followed by six digits, not part of a longer number
static SERVICE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])(9[0-9]{6})(?:[^0-9]|$)").expect("valid service code regex"));

/// One canonical line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoqItem {
    pub item_code: String,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Generated item codes for one invocation: `PDF-001`, `PDF-002`, ...
#[derive(Debug, Clone)]
pub struct ItemSequence {
    prefix: String,
    issued: u32,
}

impl ItemSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: 0,
        }
    }

    pub fn next_code(&mut self) -> String {
        self.issued += 1;
        format!("{}-{:03}", self.prefix, self.issued)
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}

/// A source row the materializer can read fields from.
pub trait ItemRow {
    /// Text of the referenced column, `None` when the row has no such column.
    fn value(&self, column: &ColumnRef) -> Option<String>;

    /// Every raw value in the row, scanned for embedded service codes.
    fn raw_values(&self) -> Vec<String>;

    /// Field names for per-row column lookup; positional rows have none.
    fn keys(&self) -> Vec<&str> {
        Vec::new()
    }
}

impl ItemRow for Vec<String> {
    fn value(&self, column: &ColumnRef) -> Option<String> {
        match column {
            ColumnRef::Index(i) => self.get(*i).cloned(),
            ColumnRef::Key(_) => None,
        }
    }

    fn raw_values(&self) -> Vec<String> {
        self.clone()
    }
}

impl ItemRow for Vec<CellValue> {
    fn value(&self, column: &ColumnRef) -> Option<String> {
        match column {
            ColumnRef::Index(i) => self.get(*i).map(CellValue::as_text),
            ColumnRef::Key(_) => None,
        }
    }

    fn raw_values(&self) -> Vec<String> {
        self.iter().map(CellValue::as_text).collect()
    }
}

impl ItemRow for Record {
    fn value(&self, column: &ColumnRef) -> Option<String> {
        match column {
            ColumnRef::Key(key) => self.get(key).map(CellValue::as_text),
            ColumnRef::Index(i) => self.fields.get(*i).map(|(_, v)| v.as_text()),
        }
    }

    fn raw_values(&self) -> Vec<String> {
        self.fields.iter().map(|(_, v)| v.as_text()).collect()
    }

    fn keys(&self) -> Vec<&str> {
        Record::keys(self).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeOutcome {
    pub items: Vec<BoqItem>,
    /// Rows skipped for carrying neither a quantity nor a description
    pub dropped: usize,
}

/// Turns mapped rows into items. Owns the code sequence, so one materializer per document.
pub struct ItemMaterializer {
    config: MaterializeConfig,
    sequence: ItemSequence,
    row_lookup: Option<SynonymTable>,
}

impl ItemMaterializer {
    pub fn new(config: &MaterializeConfig) -> Self {
        Self {
            config: config.clone(),
            sequence: ItemSequence::new(config.code_prefix.clone()),
            row_lookup: None,
        }
    }

    /// Resolve fields the mapping lacks against each row's own keys.
    pub fn with_row_lookup(mut self, synonyms: SynonymTable) -> Self {
        self.row_lookup = Some(synonyms);
        self
    }

    pub fn codes_issued(&self) -> u32 {
        self.sequence.issued()
    }

    pub fn materialize<R: ItemRow>(&mut self, rows: &[R], mapping: &ColumnMapping) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();

        for (index, row) in rows.iter().enumerate() {
            match self.materialize_row(row, mapping) {
                Some(item) => outcome.items.push(item),
                None => {
                    debug!(row = index, "Dropped row with no quantity and no description");
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }

    /// `None` when the row has zero quantity and no description.
    pub fn materialize_row<R: ItemRow>(&mut self, row: &R, mapping: &ColumnMapping) -> Option<BoqItem> {
        let text = |field: CanonicalField| self.field_text(row, mapping, field);

        let description = text(CanonicalField::Description).unwrap_or_default();
        let quantity = text(CanonicalField::Quantity).map_or(0.0, |v| parse_number_safe(&v));
        if quantity == 0.0 && description.is_empty() {
            return None;
        }

        let unit_price = text(CanonicalField::UnitPrice).map_or(0.0, |v| parse_number_safe(&v));
        let total_price = match text(CanonicalField::TotalPrice) {
            Some(total) => parse_number_safe(&total),
            None => quantity * unit_price,
        };
        let unit = text(CanonicalField::Unit).unwrap_or_else(|| self.config.default_unit.clone());
        let category = text(CanonicalField::Category);
        let item_code = text(CanonicalField::ItemCode);

        Some(BoqItem {
            item_code: item_code.unwrap_or_else(|| self.sequence.next_code()),
            description: if description.is_empty() {
                NO_DESCRIPTION.to_string()
            } else {
                description
            },
            unit,
            quantity,
            unit_price,
            total_price,
            category,
            notes: service_code(&row.raw_values()).map(|code| format!("Service Code: {}", code)),
        })
    }

    // Trimmed, non-empty text of a field; blank counts as absent
    fn field_text<R: ItemRow>(&self, row: &R, mapping: &ColumnMapping, field: CanonicalField) -> Option<String> {
        let column = match mapping.get(field) {
            Some(column) => Some(column.clone()),
            None => self.row_lookup.as_ref().and_then(|synonyms| {
                find_column(row.keys(), field, synonyms).map(|key| ColumnRef::Key(key.to_string()))
            }),
        }?;

        row.value(&column)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// First embedded service code among a row's raw values.
pub fn service_code(values: &[String]) -> Option<String> {
    values.iter().find_map(|value| {
        SERVICE_CODE
            .captures(&normalize_numeral(value))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Materialise reconstructed PDF rows with a fresh code sequence.
pub fn map_pdf_data_to_items(
    rows: &[Vec<String>],
    mapping: &ColumnMapping,
    config: &MaterializeConfig,
) -> Vec<BoqItem> {
    ItemMaterializer::new(config).materialize(rows, mapping).items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn full_mapping() -> ColumnMapping {
        ColumnMapping::from_indices([
            (CanonicalField::ItemCode, 0),
            (CanonicalField::Description, 1),
            (CanonicalField::Unit, 2),
            (CanonicalField::Quantity, 3),
            (CanonicalField::UnitPrice, 4),
            (CanonicalField::TotalPrice, 5),
        ])
    }

    #[test]
    fn test_full_row_uses_source_total() {
        let rows = vec![row(&["001", "Concrete", "m3", "50", "150", "7500"])];
        let items = map_pdf_data_to_items(&rows, &full_mapping(), &MaterializeConfig::default());

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_code, "001");
        assert_eq!(items[0].quantity, 50.0);
        assert_eq!(items[0].unit_price, 150.0);
        assert_eq!(items[0].total_price, 7500.0);
        assert!(items[0].notes.is_none());
    }

    #[test]
    fn test_missing_total_is_computed() {
        let rows = vec![row(&["001", "Concrete", "m3", "50", "150"])];
        let mapping = ColumnMapping::from_indices([
            (CanonicalField::ItemCode, 0),
            (CanonicalField::Description, 1),
            (CanonicalField::Unit, 2),
            (CanonicalField::Quantity, 3),
            (CanonicalField::UnitPrice, 4),
        ]);
        let items = map_pdf_data_to_items(&rows, &mapping, &MaterializeConfig::default());
        assert_eq!(items[0].total_price, 7500.0);
    }

    #[test]
    fn test_source_total_is_not_reconciled() {
        let rows = vec![row(&["001", "Concrete", "m3", "50", "150", "7000"])];
        let items = map_pdf_data_to_items(&rows, &full_mapping(), &MaterializeConfig::default());
        assert_eq!(items[0].total_price, 7000.0);
    }

    #[test]
    fn test_generated_codes_and_default_unit() {
        let rows = vec![
            row(&["", "Excavation", "", "10", "5", ""]),
            row(&["", "Backfill", "m3", "4", "3", ""]),
        ];
        let items = map_pdf_data_to_items(&rows, &full_mapping(), &MaterializeConfig::default());

        assert_eq!(items[0].item_code, "PDF-001");
        assert_eq!(items[1].item_code, "PDF-002");
        assert_eq!(items[0].unit, "LOT");
        assert_eq!(items[0].total_price, 50.0);
    }

    #[test]
    fn test_codes_only_issued_for_missing_codes() {
        let rows = vec![
            row(&["A-1", "Doors", "No", "2", "300", ""]),
            row(&["", "Windows", "No", "4", "250", ""]),
        ];
        let mut materializer = ItemMaterializer::new(&MaterializeConfig::default());
        let outcome = materializer.materialize(&rows, &full_mapping());

        assert_eq!(outcome.items[0].item_code, "A-1");
        assert_eq!(outcome.items[1].item_code, "PDF-001");
        assert_eq!(materializer.codes_issued(), 1);
    }

    #[test]
    fn test_sequence_is_scoped_to_one_call() {
        let rows = vec![row(&["", "Excavation", "", "10", "5", ""])];
        let config = MaterializeConfig::default();
        let first = map_pdf_data_to_items(&rows, &full_mapping(), &config);
        let second = map_pdf_data_to_items(&rows, &full_mapping(), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rows_without_signal_are_dropped_and_counted() {
        let rows = vec![
            row(&["001", "", "m3", "0", "150", ""]),
            row(&["002", "", "m3", "3", "150", ""]),
            row(&["003", "Paint", "m2", "0", "12", ""]),
        ];
        let outcome = ItemMaterializer::new(&MaterializeConfig::default()).materialize(&rows, &full_mapping());

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].description, NO_DESCRIPTION);
        assert_eq!(outcome.items[1].quantity, 0.0);
    }

    #[test]
    fn test_arabic_digits_and_service_code() {
        let rows = vec![row(&["٠٠٧", "أعمال خرسانة ٩١٢٣٤٥٦", "م٣", "٥٠", "١٥٠", ""])];
        let items = map_pdf_data_to_items(&rows, &full_mapping(), &MaterializeConfig::default());

        assert_eq!(items[0].quantity, 50.0);
        assert_eq!(items[0].total_price, 7500.0);
        assert_eq!(items[0].notes.as_deref(), Some("Service Code: 9123456"));
    }

    #[test]
    fn test_service_code_ignores_longer_numbers() {
        assert_eq!(service_code(&row(&["ref 91234567"])), None);
        assert_eq!(service_code(&row(&["x", "SC-9000001/b"])), Some("9000001".to_string()));
    }

    #[test]
    fn test_records_resolve_by_row_keys() {
        let record = Record::new(vec![
            ("Sr No".to_string(), CellValue::from("A-1")),
            ("Work Description".to_string(), CellValue::from("Plaster")),
            ("UOM".to_string(), CellValue::from("m2")),
            ("Qty".to_string(), CellValue::Number(20.0)),
            ("Rate".to_string(), CellValue::Number(7.5)),
        ]);
        let mut materializer =
            ItemMaterializer::new(&MaterializeConfig::default()).with_row_lookup(SynonymTable::default());
        let item = materializer.materialize_row(&record, &ColumnMapping::new()).unwrap();

        assert_eq!(item.item_code, "A-1");
        assert_eq!(item.unit, "m2");
        assert_eq!(item.total_price, 150.0);
    }
}
