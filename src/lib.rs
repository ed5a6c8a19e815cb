//! Coletor - Price-Transparency Portal Collector
//!
//! A headless collector that drives a browser through a government
//! price-transparency portal, survives DOM churn and access-control
//! challenges, and enriches extracted CNPJ identifiers through a
//! rate-limited public registry API.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **Driver**: Browser session abstraction with a WebDriver backend
//! - **Captcha**: Challenge detection and token-service integration
//! - **Registry**: Cached, rate-limited CNPJ lookups
//! - **Collector**: Per-target visits and run orchestration
//! - **Data**: Input catalogs and CSV output
//!
//! # Usage
//!
//! ```rust,no_run
//! use coletor::{build_targets, Collector, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load();
//!     let items = coletor::data::load_items(&config.inputs)?;
//!     let targets = build_targets(&items, &config.portal.locations);
//!
//!     let collector = Collector::with_config(config)?;
//!     let summary = collector.run(targets).await?;
//!     println!("collected {} of {}", summary.collected(), summary.attempted);
//!     Ok(())
//! }
//! ```

pub mod captcha;
pub mod collector;
pub mod core;
pub mod data;
pub mod driver;
pub mod registry;

// Re-export commonly used items
pub use collector::{CancelHandle, Collector, RunSummary};
pub use core::{build_targets, ColetorError, Config, Item, PriceRecord, Result, Target};
