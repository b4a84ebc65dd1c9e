use serde::Deserialize;
use std::path::Path;

use crate::error::{BoqError, BoqResult};
use crate::layout::TextFragment;

#[derive(Deserialize)]
struct PageDump {
    fragments: Vec<TextFragment>,
}

/// Either a bare array of pages or `{ "pages": [{ "fragments": [...] }] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FragmentDump {
    Pages(Vec<Vec<TextFragment>>),
    Document { pages: Vec<PageDump> },
}

pub fn pages_from_json(json: &str) -> BoqResult<Vec<Vec<TextFragment>>> {
    let dump: FragmentDump =
        serde_json::from_str(json).map_err(|e| BoqError::json("parsing text fragment dump", e))?;

    Ok(match dump {
        FragmentDump::Pages(pages) => pages,
        FragmentDump::Document { pages } => pages.into_iter().map(|p| p.fragments).collect(),
    })
}

/// Read per-page text fragments written by an external PDF text-layer extractor.
pub fn load_pages(path: &Path) -> BoqResult<Vec<Vec<TextFragment>>> {
    let json = std::fs::read_to_string(path).map_err(|e| BoqError::file_io(path.display().to_string(), e))?;
    let pages = pages_from_json(&json)?;
    tracing::info!(path = %path.display(), pages = pages.len(), "📄 Loaded text fragments");
    Ok(pages)
}
