//! Summary statistics, outliers and category breakdown over a final item list.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::materializer::BoqItem;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl Summary {
    /// All zeros for an empty slice.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            median,
            std_dev: variance.sqrt(),
        }
    }

    /// Distance from the mean in standard deviations; zero when there is no spread.
    pub fn deviations(&self, value: f64) -> f64 {
        if self.std_dev == 0.0 {
            0.0
        } else {
            (value - self.mean).abs() / self.std_dev
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatistics {
    pub item_count: usize,
    pub total_cost: f64,
    pub unit_price: Summary,
    pub quantity: Summary,
}

pub fn calculate_statistics(items: &[BoqItem]) -> ItemStatistics {
    let prices: Vec<f64> = items.iter().map(|i| i.unit_price).collect();
    let quantities: Vec<f64> = items.iter().map(|i| i.quantity).collect();

    ItemStatistics {
        item_count: items.len(),
        total_cost: items.iter().map(|i| i.total_price).sum(),
        unit_price: Summary::of(&prices),
        quantity: Summary::of(&quantities),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutlierAxis {
    UnitPrice,
    Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlier {
    pub item_code: String,
    pub description: String,
    pub axes: Vec<OutlierAxis>,
}

/// Items whose unit price or quantity lies more than `threshold` standard deviations
/// from the mean. An item can be flagged on both axes.
pub fn identify_outliers(items: &[BoqItem], threshold: f64) -> Vec<Outlier> {
    let stats = calculate_statistics(items);

    items
        .iter()
        .filter_map(|item| {
            let mut axes = Vec::new();
            if stats.unit_price.deviations(item.unit_price) > threshold {
                axes.push(OutlierAxis::UnitPrice);
            }
            if stats.quantity.deviations(item.quantity) > threshold {
                axes.push(OutlierAxis::Quantity);
            }
            (!axes.is_empty()).then(|| Outlier {
                item_code: item.item_code.clone(),
                description: item.description.clone(),
                axes,
            })
        })
        .collect()
}

fn category_of(item: &BoqItem) -> &str {
    item.category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(UNCATEGORIZED)
}

pub fn group_by_category(items: &[BoqItem]) -> BTreeMap<String, Vec<&BoqItem>> {
    let mut groups: BTreeMap<String, Vec<&BoqItem>> = BTreeMap::new();
    for item in items {
        groups.entry(category_of(item).to_string()).or_default().push(item);
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub category: String,
    pub item_count: usize,
    pub total_cost: f64,
    pub percentage: f64,
}

/// Each category's share of total cost, in percent.
///
/// When the whole set costs nothing the shares fall back to item counts so the
/// percentages still sum to 100.
pub fn cost_distribution(items: &[BoqItem]) -> Vec<CategoryShare> {
    let groups = group_by_category(items);
    let grand_total: f64 = items.iter().map(|i| i.total_price).sum();
    let by_count = grand_total == 0.0;

    groups
        .into_iter()
        .map(|(category, members)| {
            let total_cost: f64 = members.iter().map(|i| i.total_price).sum();
            let percentage = if by_count {
                members.len() as f64 / items.len() as f64 * 100.0
            } else {
                total_cost / grand_total * 100.0
            };
            CategoryShare {
                category,
                item_count: members.len(),
                total_cost,
                percentage,
            }
        })
        .collect()
}
