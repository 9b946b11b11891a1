use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Read the identifiers in `column` of a CSV file with headers.
///
/// Blank cells are skipped; duplicates are kept.
pub fn load_identifiers(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let Some(idx) = headers.iter().position(|h| h.trim() == column) else {
        bail!(
            "Input file {} has no `{}` column (found: {})",
            path.display(),
            column,
            headers.iter().collect::<Vec<_>>().join(", ")
        );
    };

    let mut identifiers = Vec::new();
    let mut blanks = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed input row {}", line + 2))?;
        match record.get(idx).map(str::trim) {
            Some(value) if !value.is_empty() => identifiers.push(value.to_string()),
            _ => blanks += 1,
        }
    }

    if blanks > 0 {
        warn!("Skipped {} blank `{}` cells in {}", blanks, column, path.display());
    }
    info!("Loaded {} identifiers from {}", identifiers.len(), path.display());
    Ok(identifiers)
}
