use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{FileUsi, OntologyKey};
use crate::error::MasstError;
use crate::extract::{MatchRecord, MatchTable};
use crate::table::{Table, write_rows};

pub const FILE_USI_COLUMN: &str = "file_usi";
const USI_COLUMN: &str = "USI";
const DATASET_COLUMN: &str = "MassIVE";
const FILENAME_COLUMN: &str = "Filename";

/// One physical source file with the ontology node it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub file_usi: FileUsi,
    pub key: OntologyKey,
    pub cells: Vec<String>,
}

/// Per-file metadata of one ontology, unique by file USI.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    pub path: Utf8PathBuf,
    pub key_column: String,
    pub headers: Vec<String>,
    rows: Vec<MetadataRow>,
    by_file: HashMap<FileUsi, usize>,
}

/// A match attributed to an ontology key through its file's metadata.
#[derive(Debug, Clone, Copy)]
pub struct JoinedRow<'a> {
    pub record: &'a MatchRecord,
    pub metadata: &'a MetadataRow,
}

impl<'a> JoinedRow<'a> {
    pub fn key(&self) -> &'a OntologyKey {
        &self.metadata.key
    }
}

impl MetadataTable {
    pub fn load(path: &Utf8Path, key_column: &str) -> Result<Self, MasstError> {
        let table = Table::read(path)?;
        Self::from_table(table, key_column)
    }

    pub fn from_table(table: Table, key_column: &str) -> Result<Self, MasstError> {
        let key_index = table.require_column(key_column)?;
        let file_usis = file_usi_column(&table)?;

        let mut rows = Vec::with_capacity(table.rows.len());
        let mut by_file = HashMap::new();
        let mut duplicates = 0usize;
        let mut unkeyed = 0usize;
        for (cells, file_usi) in table.rows.into_iter().zip(file_usis) {
            let Some(file_usi) = file_usi else {
                continue;
            };
            let Some(key) = OntologyKey::normalize(&cells[key_index]) else {
                unkeyed += 1;
                continue;
            };
            if by_file.contains_key(&file_usi) {
                duplicates += 1;
                continue;
            }
            by_file.insert(file_usi.clone(), rows.len());
            rows.push(MetadataRow {
                file_usi,
                key,
                cells,
            });
        }
        if duplicates > 0 {
            warn!(
                path = %table.path,
                duplicates,
                "metadata lists files more than once, keeping the first row of each"
            );
        }
        if unkeyed > 0 {
            warn!(
                path = %table.path,
                rows = unkeyed,
                column = key_column,
                "metadata rows without ontology key"
            );
        }

        Ok(Self {
            path: table.path,
            key_column: key_column.to_string(),
            headers: table.headers,
            rows,
            by_file,
        })
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, file_usi: &FileUsi) -> Option<&MetadataRow> {
        self.by_file.get(file_usi).map(|index| &self.rows[*index])
    }

    /// Number of files per ontology key.
    pub fn group_counts(&self) -> BTreeMap<OntologyKey, u64> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.key.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Inner join on the file USI. Matches from files without metadata are
    /// dropped, match order is preserved.
    pub fn join<'a>(&'a self, matches: &'a MatchTable) -> Vec<JoinedRow<'a>> {
        matches
            .rows()
            .iter()
            .filter_map(|record| {
                self.get(&record.file_usi())
                    .map(|metadata| JoinedRow { record, metadata })
            })
            .collect()
    }
}

/// File USI of every row, `None` for rows that cannot produce one.
fn file_usi_column(table: &Table) -> Result<Vec<Option<FileUsi>>, MasstError> {
    let convert = |row: usize, result: Result<FileUsi, MasstError>| match result {
        Ok(usi) => Some(usi),
        Err(err) => {
            warn!(
                path = %table.path,
                row = row + 1,
                error = %err,
                "dropping metadata row without file USI"
            );
            None
        }
    };

    if let Some(index) = table.column(FILE_USI_COLUMN).or_else(|| table.column(USI_COLUMN)) {
        return Ok(table
            .rows
            .iter()
            .enumerate()
            .map(|(row, cells)| convert(row, cells[index].parse::<FileUsi>()))
            .collect());
    }

    let filename = table.require_column(FILENAME_COLUMN)?;
    let dataset = table.require_column(DATASET_COLUMN)?;
    Ok(table
        .rows
        .iter()
        .enumerate()
        .map(|(row, cells)| {
            convert(row, FileUsi::from_dataset_file(&cells[dataset], &cells[filename]))
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataCheckReport {
    pub input: String,
    pub output: String,
    pub duplicates_file: Option<String>,
    pub rows: usize,
    pub kept: usize,
    pub duplicate_rows: usize,
}

/// Normalize a metadata table: add `file_usi` when missing, order rows by file
/// USI and then by the priority columns (descending), and keep the first row
/// of every file. All rows sharing a duplicated file USI are written to
/// `<output>.duplicates.<ext>`.
pub fn check_metadata(
    input: &Utf8Path,
    output: &Utf8Path,
    priority: &[String],
) -> Result<MetadataCheckReport, MasstError> {
    let mut table = Table::read(input)?;
    if table.column(FILE_USI_COLUMN).is_none() {
        let usis = file_usi_column(&table)?;
        table.headers.push(FILE_USI_COLUMN.to_string());
        for (row, usi) in table.rows.iter_mut().zip(usis) {
            row.push(usi.map(|usi| usi.to_string()).unwrap_or_default());
        }
    }
    let usi_index = table.require_column(FILE_USI_COLUMN)?;
    let priority_indexes = priority
        .iter()
        .map(|column| table.require_column(column))
        .collect::<Result<Vec<_>, _>>()?;

    let total = table.rows.len();
    table.rows.retain(|row| !row[usi_index].is_empty());
    table.rows.sort_by(|a, b| {
        a[usi_index].cmp(&b[usi_index]).then_with(|| {
            priority_indexes
                .iter()
                .map(|index| compare_cells(&b[*index], &a[*index]))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    });

    let mut counts = HashMap::<&str, usize>::new();
    for row in &table.rows {
        *counts.entry(row[usi_index].as_str()).or_default() += 1;
    }
    let duplicates = table
        .rows
        .iter()
        .filter(|row| counts.get(row[usi_index].as_str()).copied().unwrap_or(0) > 1)
        .cloned()
        .collect::<Vec<_>>();

    let duplicates_file = if duplicates.is_empty() {
        None
    } else {
        let path = duplicates_path(output);
        warn!(count = duplicates.len(), path = %path, "duplicated file USIs in metadata");
        write_rows(&path, &table.headers, &duplicates)?;
        Some(path.to_string())
    };

    let mut seen = HashSet::new();
    let kept = table
        .rows
        .iter()
        .filter(|row| seen.insert(row[usi_index].clone()))
        .collect::<Vec<_>>();
    let kept_rows = kept.len();
    write_rows(output, &table.headers, kept)?;
    info!(path = %output, rows = kept_rows, "wrote checked metadata");

    Ok(MetadataCheckReport {
        input: input.to_string(),
        output: output.to_string(),
        duplicates_file,
        rows: total,
        kept: kept_rows,
        duplicate_rows: duplicates.len(),
    })
}

/// Numeric cells compare as numbers, everything else lexically.
fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.total_cmp(&b),
        _ => a.cmp(b),
    }
}

fn duplicates_path(output: &Utf8Path) -> Utf8PathBuf {
    match (output.file_stem(), output.extension()) {
        (Some(stem), Some(ext)) => output.with_file_name(format!("{stem}.duplicates.{ext}")),
        _ => Utf8PathBuf::from(format!("{output}.duplicates")),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            path: Utf8PathBuf::from("memory.tsv"),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    fn record(usi: &str) -> MatchRecord {
        MatchRecord {
            delta_mass: 0.0,
            usi: usi.parse().unwrap(),
            cosine: 0.9,
            matching_peaks: 5,
            status: String::new(),
        }
    }

    #[test]
    fn first_duplicate_survives() {
        let meta = MetadataTable::from_table(
            table(
                &["file_usi", "NCBI"],
                &[
                    &["mzspec:MSV1:a", "562"],
                    &["mzspec:MSV1:a", "9606"],
                    &["mzspec:MSV1:b", "562.0"],
                ],
            ),
            "NCBI",
        )
        .unwrap();
        assert_eq!(meta.len(), 2);
        let key = &meta.get(&"mzspec:MSV1:a".parse().unwrap()).unwrap().key;
        assert_eq!(key.as_str(), "562");
        assert_eq!(
            meta.group_counts().get(&OntologyKey::normalize("562").unwrap()),
            Some(&2)
        );
    }

    #[test]
    fn file_usi_from_dataset_and_filename() {
        let meta = MetadataTable::from_table(
            table(
                &["MassIVE", "Filename", "ID"],
                &[&["MSV1", "f/a.mzML", "UBERON:1"], &["", "b.mzML", "UBERON:2"]],
            ),
            "ID",
        )
        .unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.rows()[0].file_usi.as_str(), "mzspec:MSV1:a");
    }

    #[test]
    fn missing_columns_are_fatal() {
        assert_matches!(
            MetadataTable::from_table(table(&["file_usi"], &[]), "NCBI"),
            Err(MasstError::MissingColumn { .. })
        );
        assert_matches!(
            MetadataTable::from_table(table(&["NCBI"], &[]), "NCBI"),
            Err(MasstError::MissingColumn { .. })
        );
    }

    #[test]
    fn join_drops_unknown_files() {
        let meta = MetadataTable::from_table(
            table(&["file_usi", "ID"], &[&["mzspec:MSV1:a.mzML", "x"]]),
            "ID",
        )
        .unwrap();
        let matches = MatchTable::new(vec![
            record("mzspec:MSV1:a.mzML:scan:3"),
            record("mzspec:MSV2:zzz.mzML:scan:1"),
        ]);
        let joined = meta.join(&matches);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].key().as_str(), "x");
    }

    #[test]
    fn scan_prefixed_file_names_join_separately() {
        let meta = MetadataTable::from_table(
            table(
                &["file_usi", "ID"],
                &[
                    &["mzspec:MSV000001:scan_042.mzML", "x"],
                    &["mzspec:MSV000001:scan_043.mzML", "y"],
                ],
            ),
            "ID",
        )
        .unwrap();
        assert_eq!(meta.len(), 2);
        let matches = MatchTable::new(vec![record("mzspec:MSV000001:scan_042.mzML:scan:17")]);
        let joined = meta.join(&matches);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].key().as_str(), "x");
    }

    #[test]
    fn check_writes_deduplicated_table_and_duplicates() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let input = root.join("in.csv");
        fs::write(
            input.as_std_path(),
            "MassIVE,Filename,Taxa_NCBI\nMSV1,a.mzML,1\nMSV1,a.mzXML,5\nMSV1,b.mzML,2\n",
        )
        .unwrap();
        let output = root.join("out/checked.csv");
        let report = check_metadata(&input, &output, &["Taxa_NCBI".to_string()]).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.kept, 2);
        assert_eq!(report.duplicate_rows, 2);

        let checked = Table::read(&output).unwrap();
        let usi = checked.column("file_usi").unwrap();
        let taxa = checked.column("Taxa_NCBI").unwrap();
        assert_eq!(checked.rows[0][usi], "mzspec:MSV1:a");
        assert_eq!(checked.rows[0][taxa], "5");
        assert!(root.join("out/checked.duplicates.csv").as_std_path().exists());
    }
}
