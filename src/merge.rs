use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

/// The four record families a usaspending award download contains, in the
/// order their files sort inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    AssistancePrime,
    AssistanceSub,
    ContractPrime,
    ContractSub,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::AssistancePrime,
        Category::AssistanceSub,
        Category::ContractPrime,
        Category::ContractSub,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Category::AssistancePrime => "assistance_prime_award.csv",
            Category::AssistanceSub => "assistance_sub_award.csv",
            Category::ContractPrime => "contract_prime_award.csv",
            Category::ContractSub => "contract_sub_award.csv",
        }
    }

    /// Category a file name announces, if it names exactly one family and one level.
    pub fn from_name_marker(name: &str) -> Option<Category> {
        let name = name.to_lowercase();
        let assistance = name.contains("assistance");
        let contract = name.contains("contract");
        let prime = name.contains("prime");
        let sub = name.contains("sub");

        match (assistance, contract, prime, sub) {
            (true, false, true, false) => Some(Category::AssistancePrime),
            (true, false, false, true) => Some(Category::AssistanceSub),
            (false, true, true, false) => Some(Category::ContractPrime),
            (false, true, false, true) => Some(Category::ContractSub),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        match self {
            Category::AssistancePrime => 0,
            Category::AssistanceSub => 1,
            Category::ContractPrime => 2,
            Category::ContractSub => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::AssistancePrime => "assistance prime awards",
            Category::AssistanceSub => "assistance sub-awards",
            Category::ContractPrime => "contract prime awards",
            Category::ContractSub => "contract sub-awards",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no .zip archives in {0}")]
    NoArchives(PathBuf),
    #[error("{archive} holds {found} csv files, expected 4")]
    ArchiveShape { archive: PathBuf, found: usize },
    #[error("{archive}: `{file}` sorts into the {expected} slot but is named as another category")]
    CategoryMismatch {
        archive: PathBuf,
        file: String,
        expected: Category,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rows under a header that grows as files with new columns are appended.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Append rows read under `headers`; unseen columns are added at the end
    /// and earlier rows read them as empty.
    pub fn append(&mut self, headers: &[String], rows: Vec<Vec<String>>) {
        let mut index: HashMap<&str, usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let mut added = Vec::new();
        let mut slots = Vec::with_capacity(headers.len());
        for h in headers {
            let slot = match index.get(h.as_str()) {
                Some(&i) => i,
                None => {
                    let i = self.headers.len() + added.len();
                    index.insert(h.as_str(), i);
                    added.push(h.clone());
                    i
                }
            };
            slots.push(slot);
        }
        self.headers.extend(added);

        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        for row in rows {
            let mut out = vec![String::new(); width];
            for (value, &slot) in row.into_iter().zip(&slots) {
                out[slot] = value;
            }
            self.rows.push(out);
        }
    }

    /// Remove columns whose cells are all empty strings; returns how many went.
    ///
    /// A cell holding only whitespace is a value and keeps its column.
    pub fn drop_empty_columns(&mut self) -> usize {
        let keep: Vec<bool> = (0..self.headers.len())
            .map(|c| self.rows.iter().any(|r| !r[c].is_empty()))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped == 0 {
            return 0;
        }

        let retain = |values: &mut Vec<String>| {
            let mut it = keep.iter();
            values.retain(|_| *it.next().unwrap_or(&true));
        };
        retain(&mut self.headers);
        for row in &mut self.rows {
            retain(row);
        }
        dropped
    }

    fn write(&self, path: &Path) -> Result<(), MergeError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MergeSummary {
    pub archives: usize,
    /// Rows per category, in `Category::ALL` order.
    pub rows: [usize; 4],
    pub dropped_columns: usize,
    pub files_written: Vec<PathBuf>,
}

impl MergeSummary {
    pub fn print(&self) {
        println!("Merged {} archives:", self.archives);
        for (category, path) in Category::ALL.iter().zip(&self.files_written) {
            println!(
                "  {:<24} {:>8} rows -> {}",
                category.to_string(),
                self.rows[category.index()],
                path.display()
            );
        }
        println!("Dropped {} empty columns.", self.dropped_columns);
    }
}

/// Merge every `.zip` archive in `dir` into the four category files in `out`.
///
/// All archives are checked before any rows are read, so a malformed download
/// produces an error and no output.
pub fn merge_archives(dir: &Path, out: &Path) -> Result<MergeSummary, MergeError> {
    let archives = list_archives(dir)?;
    if archives.is_empty() {
        return Err(MergeError::NoArchives(dir.to_path_buf()));
    }

    let mut plans = Vec::with_capacity(archives.len());
    for path in &archives {
        let members = classify(path)?;
        debug!("{}: {:?}", path.display(), members);
        plans.push((path, members));
    }

    let mut tables: [Table; 4] = Default::default();
    for (path, members) in plans {
        let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
        for (category, name) in Category::ALL.iter().zip(members) {
            let (headers, rows) = read_csv(&mut archive, &name)?;
            info!(
                "{}: {} rows of {} from {}",
                path.display(),
                rows.len(),
                category,
                name
            );
            tables[category.index()].append(&headers, rows);
        }
    }

    fs::create_dir_all(out)?;
    let mut summary = MergeSummary {
        archives: archives.len(),
        ..Default::default()
    };
    for (category, table) in Category::ALL.iter().zip(tables.iter_mut()) {
        summary.dropped_columns += table.drop_empty_columns();
        summary.rows[category.index()] = table.rows.len();

        let path = out.join(category.file_name());
        table.write(&path)?;
        info!("Wrote {} ({} rows)", path.display(), table.rows.len());
        summary.files_written.push(path);
    }
    Ok(summary)
}

fn list_archives(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip && path.is_file() {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}

/// Sorted csv member names of `path`, one per category.
fn classify(path: &Path) -> Result<Vec<String>, MergeError> {
    let archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.to_lowercase().ends_with(".csv") && !n.ends_with('/'))
        .map(str::to_string)
        .collect();
    names.sort();

    if names.len() != Category::ALL.len() {
        return Err(MergeError::ArchiveShape {
            archive: path.to_path_buf(),
            found: names.len(),
        });
    }
    for (expected, name) in Category::ALL.iter().zip(&names) {
        if let Some(named) = Category::from_name_marker(name) {
            if named != *expected {
                return Err(MergeError::CategoryMismatch {
                    archive: path.to_path_buf(),
                    file: name.clone(),
                    expected: *expected,
                });
            }
        }
    }
    Ok(names)
}

fn read_csv<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<(Vec<String>, Vec<Vec<String>>), MergeError> {
    let file = archive.by_name(name)?;
    let mut reader = csv::Reader::from_reader(file);

    let mut seen: HashMap<String, usize> = HashMap::new();
    let headers = reader
        .headers()?
        .iter()
        .map(|h| {
            let n = seen.entry(h.to_string()).or_insert(0);
            let header = if *n == 0 {
                h.to_string()
            } else {
                format!("{h}.{n}")
            };
            *n += 1;
            header
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}
