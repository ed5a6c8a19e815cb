//! Input catalog loading
//!
//! Items arrive as two parallel JSON arrays: one of EAN barcodes, one of
//! descriptions. Anything wrong with them is a configuration error; a run
//! with no catalog has nothing to do.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::core::config::InputConfig;
use crate::core::{ColetorError, Item, Result};

/// Load and pair the item files named in the configuration
pub fn load_items(config: &InputConfig) -> Result<Vec<Item>> {
    let eans = read_string_array(&config.items)?;
    let descriptions = read_string_array(&config.descriptions)?;

    if eans.len() != descriptions.len() {
        return Err(ColetorError::config(format!(
            "item files disagree: {} EANs vs {} descriptions",
            eans.len(),
            descriptions.len()
        )));
    }

    let items: Vec<Item> = eans
        .into_iter()
        .zip(descriptions)
        .map(|(ean, description)| Item::new(ean, description))
        .collect();
    info!(items = items.len(), "catalog loaded");
    Ok(items)
}

fn read_string_array(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ColetorError::config(format!("cannot read input file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ColetorError::config(format!(
            "input file {} is not a JSON array of strings: {}",
            path.display(),
            e
        ))
    })
}
