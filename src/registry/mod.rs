//! Registry module - rate-limited CNPJ enrichment
//!
//! Looks establishments up in the public registry API, memoizing results
//! for the lifetime of the process and self-throttling to the API quota
//! so the calling identity never gets blocked server-side.

pub mod client;
pub mod rate;

pub use client::{HttpRegistryApi, RegistryApi, RegistryClient, RegistryRecord, RegistryResponse};
pub use rate::RateWindow;
