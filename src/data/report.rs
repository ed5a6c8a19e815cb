//! CSV record output
//!
//! One row per collected record, headers from the record's field names.
//! Reading is the exact inverse, so a written file round-trips.

use std::path::Path;

use tracing::info;

use crate::core::{PriceRecord, Result};

/// Write all records to a CSV file, overwriting it
pub fn write_records(path: &Path, records: &[PriceRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(rows = records.len(), path = %path.display(), "report written");
    Ok(())
}

/// Read records back from a CSV file
pub fn read_records(path: &Path) -> Result<Vec<PriceRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}
