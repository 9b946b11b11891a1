use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::batch::batch_file_name;
use crate::record::Tabular;

/// Where one profile writes its per-batch files, relative to the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub entity_dir: &'static str,
    pub entity_prefix: &'static str,
    pub funding_dir: &'static str,
    pub funding_prefix: &'static str,
}

impl OutputLayout {
    pub fn entity_path(&self, root: &Path, number: usize) -> PathBuf {
        root.join(self.entity_dir)
            .join(batch_file_name(self.entity_prefix, number))
    }

    pub fn funding_path(&self, root: &Path, number: usize) -> PathBuf {
        root.join(self.funding_dir)
            .join(batch_file_name(self.funding_prefix, number))
    }
}

/// Write `rows` to `path`, replacing any earlier file.
///
/// The header is always written, also for an empty batch. Parent directories
/// are created on first use.
pub fn write_rows<R: Tabular>(path: &Path, rows: &[R]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(R::COLUMNS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntityRecord, Field, FundingRecord};

    const LAYOUT: OutputLayout = OutputLayout {
        entity_dir: "company_output",
        entity_prefix: "company_batch_",
        funding_dir: "funding_output",
        funding_prefix: "funding_output_",
    };

    #[test]
    fn paths_follow_batch_number() {
        let root = Path::new("/data");
        assert_eq!(
            LAYOUT.entity_path(root, 3),
            PathBuf::from("/data/company_output/company_batch_3.csv")
        );
        assert_eq!(
            LAYOUT.funding_path(root, 3),
            PathBuf::from("/data/funding_output/funding_output_3.csv")
        );
    }

    #[test]
    fn empty_batch_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = LAYOUT.entity_path(dir.path(), 1);
        write_rows::<EntityRecord>(&path, &[]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), EntityRecord::COLUMNS.join(","));
    }

    #[test]
    fn rewrite_replaces_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = LAYOUT.funding_path(dir.path(), 2);
        let row = FundingRecord {
            keyword: "A".into(),
            amount: "$5,000".into(),
            ..Default::default()
        };
        write_rows(&path, &[row.clone(), row.clone()]).unwrap();
        write_rows(&path, &[row]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][3], "$5,000");
    }

    #[test]
    fn absent_fields_are_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_1.csv");
        let mut rec = EntityRecord::new("acme");
        rec.set(Field::LegalName, Some("ACME, INC.".into()));
        write_rows(&path, &[rec]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "ACME, INC.");
        assert_eq!(&row[2], "");
    }
}
