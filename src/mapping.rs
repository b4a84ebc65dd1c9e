//! Bilingual column-to-field mapping.
//!
//! Column names are normalised (folded case, whitespace to `_`, punctuation removed) and
//! looked up in a per-field synonym table. The table is plain data so new locales are
//! added through configuration rather than code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::config::MappingConfig;
use crate::error::{BoqError, BoqResult};
use crate::text::fold_case;

/// The fixed semantic attributes of a BOQ line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    ItemCode,
    Description,
    Unit,
    Quantity,
    UnitPrice,
    TotalPrice,
    Category,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::ItemCode,
        CanonicalField::Description,
        CanonicalField::Unit,
        CanonicalField::Quantity,
        CanonicalField::UnitPrice,
        CanonicalField::TotalPrice,
        CanonicalField::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::ItemCode => "itemCode",
            CanonicalField::Description => "description",
            CanonicalField::Unit => "unit",
            CanonicalField::Quantity => "quantity",
            CanonicalField::UnitPrice => "unitPrice",
            CanonicalField::TotalPrice => "totalPrice",
            CanonicalField::Category => "category",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = BoqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_column_name(s).replace('_', "");
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str().to_lowercase() == wanted)
            .ok_or_else(|| BoqError::configuration(format!("unknown canonical field: {}", s)))
    }
}

fn default_synonyms_for(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::ItemCode => &[
            "item_code", "itemcode", "code", "item", "item_no", "no", "number", "id", "ref",
            "s_no", "sr_no", "رقم", "رقم_البند", "البند", "بند", "الرمز", "رمز", "كود",
        ],
        CanonicalField::Description => &[
            "description", "desc", "item_description", "description_of_work", "details",
            "specification", "work", "الوصف", "وصف", "وصف_البند", "البيان", "بيان",
        ],
        CanonicalField::Unit => &["unit", "uom", "unit_of_measure", "units", "وحدة", "الوحدة"],
        CanonicalField::Quantity => &["quantity", "qty", "quan", "quantities", "الكمية", "كمية"],
        CanonicalField::UnitPrice => &[
            "unit_price", "unitprice", "rate", "price", "unit_rate", "unit_cost", "سعر_الوحدة",
            "السعر", "سعر", "الفئة",
        ],
        CanonicalField::TotalPrice => &[
            "total_price", "totalprice", "total", "amount", "total_amount", "total_cost", "value",
            "الاجمالي", "اجمالي", "المجموع", "القيمة", "المبلغ",
        ],
        CanonicalField::Category => &[
            "category", "type", "group", "trade", "division", "التصنيف", "القسم", "النوع",
        ],
    }
}

/// Normalise a column name for synonym lookup.
pub fn normalize_column_name(name: &str) -> String {
    let folded = fold_case(name.trim());
    let mut normalized = String::with_capacity(folded.len());
    let mut pending_underscore = false;

    for c in folded.chars() {
        if c.is_whitespace() {
            pending_underscore = !normalized.is_empty();
        } else if c.is_alphanumeric() || c == '_' {
            if pending_underscore {
                normalized.push('_');
                pending_underscore = false;
            }
            normalized.push(c);
        }
    }
    normalized
}

/// The name itself plus the name with a bracketed suffix removed: `Unit Price (SAR)`.
fn candidate_names(name: &str) -> Vec<String> {
    let mut candidates = vec![normalize_column_name(name)];
    if let Some(open) = name.find(['(', '[']) {
        let stripped = normalize_column_name(&name[..open]);
        if !stripped.is_empty() && !candidates.contains(&stripped) {
            candidates.push(stripped);
        }
    }
    candidates
}

/// Normalised synonym sets per canonical field.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    fields: BTreeMap<CanonicalField, BTreeSet<String>>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        let fields = CanonicalField::ALL
            .into_iter()
            .map(|field| {
                let names = default_synonyms_for(field)
                    .iter()
                    .map(|s| normalize_column_name(s))
                    .collect();
                (field, names)
            })
            .collect();
        Self { fields }
    }
}

impl SynonymTable {
    pub fn from_config(config: &MappingConfig) -> BoqResult<Self> {
        let mut table = if config.extend_defaults {
            Self::default()
        } else {
            Self {
                fields: BTreeMap::new(),
            }
        };

        for (field_name, synonyms) in &config.synonyms {
            let field: CanonicalField = field_name.parse()?;
            table.extend(field, synonyms.iter().map(String::as_str));
        }
        Ok(table)
    }

    pub fn extend<'a>(&mut self, field: CanonicalField, synonyms: impl IntoIterator<Item = &'a str>) {
        let set = self.fields.entry(field).or_default();
        set.extend(
            synonyms
                .into_iter()
                .map(normalize_column_name)
                .filter(|s| !s.is_empty()),
        );
    }

    /// The first canonical field (in declaration order) that accepts this column name.
    pub fn match_column(&self, name: &str) -> Option<CanonicalField> {
        let candidates = candidate_names(name);
        CanonicalField::ALL.into_iter().find(|field| {
            self.fields
                .get(field)
                .is_some_and(|set| candidates.iter().any(|c| set.contains(c)))
        })
    }

    pub fn accepts(&self, field: CanonicalField, name: &str) -> bool {
        let Some(set) = self.fields.get(&field) else {
            return false;
        };
        candidate_names(name).iter().any(|c| set.contains(c))
    }
}

/// Where a canonical field's value lives in a source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Key(String),
}

/// Partial mapping of canonical fields to source columns. Unmapped fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: BTreeMap<CanonicalField, ColumnRef>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional mapping from `(field, column index)` pairs.
    pub fn from_indices(pairs: impl IntoIterator<Item = (CanonicalField, usize)>) -> Self {
        Self {
            columns: pairs
                .into_iter()
                .map(|(field, index)| (field, ColumnRef::Index(index)))
                .collect(),
        }
    }

    pub fn insert(&mut self, field: CanonicalField, column: ColumnRef) {
        self.columns.insert(field, column);
    }

    pub fn get(&self, field: CanonicalField) -> Option<&ColumnRef> {
        self.columns.get(&field)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &ColumnRef)> {
        self.columns.iter().map(|(field, column)| (*field, column))
    }

    /// Entries of `overrides` replace this mapping's entries for the same field.
    pub fn overridden_by(&self, overrides: &ColumnMapping) -> ColumnMapping {
        let mut merged = self.clone();
        for (field, column) in overrides.iter() {
            merged.insert(field, column.clone());
        }
        merged
    }
}

/// Map a header row to canonical fields by column index.
///
/// Returns `None` when no column matched, so the caller can ask for a manual mapping.
pub fn detect_column_mapping<S: AsRef<str>>(headers: &[S], synonyms: &SynonymTable) -> Option<ColumnMapping> {
    detect_with(headers, synonyms, |index, _| ColumnRef::Index(index))
}

/// Map keyed-record field names to canonical fields by key.
pub fn detect_key_mapping<S: AsRef<str>>(keys: &[S], synonyms: &SynonymTable) -> Option<ColumnMapping> {
    detect_with(keys, synonyms, |_, key| ColumnRef::Key(key.to_string()))
}

fn detect_with<S: AsRef<str>>(
    names: &[S],
    synonyms: &SynonymTable,
    column_ref: impl Fn(usize, &str) -> ColumnRef,
) -> Option<ColumnMapping> {
    let mut mapping = ColumnMapping::new();

    for (index, name) in names.iter().enumerate() {
        let name = name.as_ref();
        if let Some(field) = synonyms.match_column(name) {
            if !mapping.contains(field) {
                mapping.insert(field, column_ref(index, name));
            }
        }
    }

    if mapping.is_empty() {
        None
    } else {
        Some(mapping)
    }
}

/// Find the key of a row that holds `field`, searching the row's own keys.
pub fn find_column<'a, I>(keys: I, field: CanonicalField, synonyms: &SynonymTable) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter().find(|key| synonyms.accepts(field, key))
}
