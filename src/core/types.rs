//! Shared types used across collector modules
//!
//! Contains locators, collection targets, and the output record shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel written into enrichment fields when registry data is missing
pub const UNKNOWN: &str = "unknown";

/// Timestamp format stamped onto collected records.
///
/// Kept stable so written records re-parse byte-for-byte.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a locator expression should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    /// CSS selector
    Css,
    /// XPath expression
    XPath,
}

/// A strategy + expression pair identifying page elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Lookup strategy
    pub strategy: LocatorStrategy,
    /// Selector expression
    pub expression: String,
}

impl Locator {
    /// Create a CSS locator
    pub fn css(expression: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Css,
            expression: expression.into(),
        }
    }

    /// Create an XPath locator
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::XPath,
            expression: expression.into(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.strategy {
            LocatorStrategy::Css => write!(f, "css={}", self.expression),
            LocatorStrategy::XPath => write!(f, "xpath={}", self.expression),
        }
    }
}

/// One catalog entry: a barcode and its human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// EAN barcode searched on the portal
    pub ean: String,
    /// Product description carried into the output
    pub description: String,
}

impl Item {
    /// Create a new catalog item
    pub fn new(ean: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            ean: ean.into(),
            description: description.into(),
        }
    }
}

/// One collection attempt: an item paired with a portal location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// EAN barcode
    pub ean: String,
    /// Product description
    pub description: String,
    /// Display name of the location (used in logs)
    pub location_name: String,
    /// Portal location code
    pub location_code: String,
}

/// Build the full cross product of items and locations.
///
/// Sequential runs process targets in this order: all locations for the
/// first item, then all locations for the second, and so on.
pub fn build_targets(items: &[Item], locations: &BTreeMap<String, String>) -> Vec<Target> {
    let mut targets = Vec::with_capacity(items.len() * locations.len());
    for item in items {
        for (name, code) in locations {
            targets.push(Target {
                ean: item.ean.clone(),
                description: item.description.clone(),
                location_name: name.clone(),
                location_code: code.clone(),
            });
        }
    }
    targets
}

/// Registry-derived fields merged into a collected record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    /// Establishment neighborhood
    pub neighborhood: String,
    /// Establishment city
    pub city: String,
    /// Two-letter state code
    pub region_code: String,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            neighborhood: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            region_code: UNKNOWN.to_string(),
        }
    }
}

/// One fully collected price observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// EAN barcode
    pub ean: String,
    /// Product description from the catalog
    pub description: String,
    /// Price text as displayed on the portal
    pub price: String,
    /// Wall-clock collection time, formatted with [`TIMESTAMP_FORMAT`]
    pub collected_at: String,
    /// Establishment name from the portal listing
    pub establishment: String,
    /// Establishment neighborhood from the registry
    pub neighborhood: String,
    /// Establishment city from the registry
    pub city: String,
    /// Establishment state code from the registry
    pub region_code: String,
    /// CNPJ extracted from the listing (digits only, may be empty)
    pub cnpj: String,
    /// Portal location code the search ran under
    pub location_code: String,
    /// Jurisdiction code of the portal
    pub jurisdiction: String,
}
