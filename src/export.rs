use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::{BoqError, BoqResult};
use crate::materializer::BoqItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

/// JSON output wrapper stamped with generation time
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T: Serialize> {
    pub generated_at: DateTime<Utc>,
    pub generator: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            generated_at: Utc::now(),
            generator: format!("chonker-boq {}", env!("CARGO_PKG_VERSION")),
            data,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ItemList<T> {
    items: T,
}

// Flat row with every column present, as csv needs a fixed header
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvItem<'a> {
    item_code: &'a str,
    description: &'a str,
    unit: &'a str,
    quantity: f64,
    unit_price: f64,
    total_price: f64,
    category: &'a str,
    notes: &'a str,
}

impl<'a> From<&'a BoqItem> for CsvItem<'a> {
    fn from(item: &'a BoqItem) -> Self {
        Self {
            item_code: &item.item_code,
            description: &item.description,
            unit: &item.unit,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            category: item.category.as_deref().unwrap_or_default(),
            notes: item.notes.as_deref().unwrap_or_default(),
        }
    }
}

pub fn items_to_csv<W: Write>(items: &[BoqItem], writer: W) -> BoqResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for item in items {
        csv_writer
            .serialize(CsvItem::from(item))
            .map_err(|e| BoqError::csv("item export", e))?;
    }
    csv_writer
        .flush()
        .map_err(|e| BoqError::file_io("item export", e))?;
    Ok(())
}

/// Items inside a timestamped envelope: `{ generatedAt, generator, items }`.
pub fn items_to_json<W: Write>(items: &[BoqItem], writer: W) -> BoqResult<()> {
    serde_json::to_writer_pretty(writer, &Envelope::new(ItemList { items }))
        .map_err(|e| BoqError::json("item export", e))
}

pub fn write_items(items: &[BoqItem], format: OutputFormat, path: &Path) -> BoqResult<()> {
    let file = std::fs::File::create(path).map_err(|e| BoqError::file_io(path.display().to_string(), e))?;
    let writer = std::io::BufWriter::new(file);

    match format {
        OutputFormat::Csv => items_to_csv(items, writer)?,
        OutputFormat::Json => items_to_json(items, writer)?,
    }

    info!(path = %path.display(), items = items.len(), ?format, "📝 Items exported");
    Ok(())
}

/// Read items written by [`items_to_json`], or a bare JSON array of items.
pub fn read_items_json(path: &Path) -> BoqResult<Vec<BoqItem>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ItemsFile {
        Bare(Vec<BoqItem>),
        Wrapped(ItemList<Vec<BoqItem>>),
    }

    let json = std::fs::read_to_string(path).map_err(|e| BoqError::file_io(path.display().to_string(), e))?;
    let parsed: ItemsFile =
        serde_json::from_str(&json).map_err(|e| BoqError::json(format!("reading items from {}", path.display()), e))?;

    Ok(match parsed {
        ItemsFile::Bare(items) => items,
        ItemsFile::Wrapped(list) => list.items,
    })
}
