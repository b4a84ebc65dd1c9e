use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::config::ValidationConfig;
use crate::materializer::{BoqItem, NO_DESCRIPTION};
use crate::numerals::normalize_numeral;

const DEDUP_DESCRIPTION_CHARS: usize = 30;

/// Why an item failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "camelCase")]
pub enum ValidationIssue {
    MissingDescription,
    NonPositiveQuantity { quantity: f64 },
    NegativeUnitPrice { unit_price: f64 },
    NegativeTotalPrice { total_price: f64 },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingDescription => write!(f, "Description is required"),
            ValidationIssue::NonPositiveQuantity { quantity } => {
                write!(f, "Quantity must be greater than zero (got {})", quantity)
            }
            ValidationIssue::NegativeUnitPrice { unit_price } => {
                write!(f, "Unit price cannot be negative (got {})", unit_price)
            }
            ValidationIssue::NegativeTotalPrice { total_price } => {
                write!(f, "Total price cannot be negative (got {})", total_price)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidItem {
    pub item: BoqItem,
    pub reasons: Vec<ValidationIssue>,
}

impl InvalidItem {
    pub fn reason_text(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: Vec<BoqItem>,
    pub invalid: Vec<InvalidItem>,
}

impl ValidationResult {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    /// Valid items, followed by invalid ones when the caller keeps them for review.
    pub fn into_items(self, keep_invalid: bool) -> Vec<BoqItem> {
        let mut items = self.valid;
        if keep_invalid {
            items.extend(self.invalid.into_iter().map(|invalid| invalid.item));
        }
        items
    }
}

/// A stated total that disagrees with quantity × unit price. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalMismatch {
    pub item_code: String,
    pub stated_total: f64,
    pub computed_total: f64,
}

pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn issues(&self, item: &BoqItem) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if item.description.trim().is_empty() || item.description == NO_DESCRIPTION {
            issues.push(ValidationIssue::MissingDescription);
        }
        if item.quantity <= 0.0 {
            issues.push(ValidationIssue::NonPositiveQuantity {
                quantity: item.quantity,
            });
        }
        if !self.config.allow_negative_prices {
            if item.unit_price < 0.0 {
                issues.push(ValidationIssue::NegativeUnitPrice {
                    unit_price: item.unit_price,
                });
            }
            if item.total_price < 0.0 {
                issues.push(ValidationIssue::NegativeTotalPrice {
                    total_price: item.total_price,
                });
            }
        }

        issues
    }

    /// Partition items into valid and invalid. Nothing is discarded.
    pub fn validate(&self, items: Vec<BoqItem>) -> ValidationResult {
        let mut result = ValidationResult::default();

        for item in items {
            let reasons = self.issues(&item);
            if reasons.is_empty() {
                result.valid.push(item);
            } else {
                debug!(item_code = %item.item_code, ?reasons, "Item failed validation");
                result.invalid.push(InvalidItem { item, reasons });
            }
        }

        result
    }

    /// Deduplicate (when configured), validate, then sort the valid items (when configured).
    pub fn run(&self, items: Vec<BoqItem>) -> ValidationResult {
        let before = items.len();
        let items = if self.config.deduplicate {
            deduplicate_items(items)
        } else {
            items
        };

        let mut result = self.validate(items);
        if self.config.sort_by_code {
            sort_items(&mut result.valid);
        }

        info!(
            items = before,
            duplicates = before - result.total(),
            valid = result.valid.len(),
            invalid = result.invalid.len(),
            "✅ Validation complete"
        );
        result
    }
}

/// Validate with the default rules.
pub fn validate_items(items: Vec<BoqItem>) -> ValidationResult {
    Validator::new(&ValidationConfig::default()).validate(items)
}

/// Keep the first item per item code and description prefix.
pub fn deduplicate_items(items: Vec<BoqItem>) -> Vec<BoqItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let prefix: String = item.description.chars().take(DEDUP_DESCRIPTION_CHARS).collect();
            seen.insert((item.item_code.clone(), prefix))
        })
        .collect()
}

/// Sort by item code: integer codes numerically, ahead of all other codes, which sort
/// lexicographically. Equal codes keep their order.
pub fn sort_items(items: &mut [BoqItem]) {
    items.sort_by(|a, b| compare_codes(&a.item_code, &b.item_code));
}

fn compare_codes(a: &str, b: &str) -> Ordering {
    match (integer_code(a), integer_code(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn integer_code(code: &str) -> Option<i64> {
    normalize_numeral(code.trim()).parse().ok()
}

/// Items whose stated total differs from quantity × unit price by more than `tolerance`
/// (relative). Items are never changed or invalidated by this check.
pub fn find_total_mismatches(items: &[BoqItem], tolerance: f64) -> Vec<TotalMismatch> {
    items
        .iter()
        .filter_map(|item| {
            let computed = item.quantity * item.unit_price;
            let scale = computed.abs().max(item.total_price.abs());
            let difference = (item.total_price - computed).abs();
            (scale > 0.0 && difference > tolerance * scale).then(|| TotalMismatch {
                item_code: item.item_code.clone(),
                stated_total: item.total_price,
                computed_total: computed,
            })
        })
        .collect()
}
