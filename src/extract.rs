use std::collections::{BTreeMap, HashSet};

use camino::Utf8Path;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{FileUsi, Usi};
use crate::error::MasstError;
use crate::table::{delimiter_for, write_records, write_rows};

pub const MATCH_COLUMNS: [&str; 5] = ["Delta Mass", "USI", "Cosine", "Matching Peaks", "Status"];
/// Header of the placeholder written when a search returned no matches.
pub const EMPTY_MATCH_COLUMNS: [&str; 4] = ["USI", "Cosine", "Matching Peaks", "Status"];
pub const LIBRARY_COLUMNS: [&str; 7] = [
    "USI",
    "GNPSLibraryAccession",
    "Cosine",
    "Matching Peaks",
    "CompoundName",
    "Adduct",
    "Charge",
];

/// One spectral match returned by fastMASST, column names as in the exported
/// match tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "Delta Mass", default)]
    pub delta_mass: f64,
    #[serde(rename = "USI")]
    pub usi: Usi,
    #[serde(rename = "Cosine")]
    pub cosine: f64,
    #[serde(rename = "Matching Peaks")]
    pub matching_peaks: u32,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl MatchRecord {
    pub fn dataset_id(&self) -> &str {
        self.usi.dataset()
    }

    pub fn file_usi(&self) -> FileUsi {
        self.usi.file_usi()
    }

    fn from_row(row: &Map<String, Value>) -> Option<Self> {
        let usi = match field_string(row, "USI").map(|raw| raw.parse::<Usi>()) {
            Some(Ok(usi)) => usi,
            Some(Err(err)) => {
                warn!(error = %err, "dropping match with invalid USI");
                return None;
            }
            None => {
                warn!("dropping match without USI");
                return None;
            }
        };
        let Some(cosine) = field_f64(row, "Cosine").and_then(normalize_cosine) else {
            warn!(usi = %usi, "dropping match without a valid cosine");
            return None;
        };
        let Some(matching_peaks) = field_f64(row, "Matching Peaks")
            .filter(|peaks| *peaks >= 0.0)
            .map(|peaks| peaks as u32)
        else {
            warn!(usi = %usi, "dropping match without matching peak count");
            return None;
        };
        Some(Self {
            delta_mass: field_f64(row, "Delta Mass").unwrap_or(0.0),
            usi,
            cosine,
            matching_peaks,
            status: field_string(row, "Status").unwrap_or_default(),
        })
    }
}

/// Scores within rounding noise of 1 are clamped, anything else outside
/// `[0, 1]` is rejected.
fn normalize_cosine(cosine: f64) -> Option<f64> {
    const NOISE: f64 = 1e-6;
    if (0.0..=1.0).contains(&cosine) {
        Some(cosine)
    } else if cosine > 1.0 && cosine - 1.0 <= NOISE {
        Some(1.0)
    } else {
        None
    }
}

/// A match outside the precursor tolerance, kept in analog searches.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogMatch {
    pub record: MatchRecord,
    pub rounded_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryMatch {
    #[serde(rename = "USI")]
    pub usi: String,
    #[serde(rename = "GNPSLibraryAccession")]
    pub accession: String,
    #[serde(rename = "Cosine")]
    pub cosine: f64,
    #[serde(rename = "Matching Peaks")]
    pub matching_peaks: u32,
    #[serde(rename = "CompoundName")]
    pub compound_name: String,
    #[serde(rename = "Adduct")]
    pub adduct: String,
    #[serde(rename = "Charge")]
    pub charge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    #[serde(rename = "Dataset")]
    pub dataset: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Matches")]
    pub matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    pub precursor_mz_tol: f64,
    pub min_matched_signals: u32,
    pub analog: bool,
    pub best_match_per_file: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchTable {
    rows: Vec<MatchRecord>,
}

impl MatchTable {
    pub fn new(rows: Vec<MatchRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[MatchRecord] {
        &self.rows
    }

    /// Keep the best scoring match of every source file, ranked by cosine and
    /// then by matched peaks. Several scans of one file would otherwise count
    /// more than once in the trees.
    pub fn best_match_per_file(self) -> Self {
        let mut rows = self.rows;
        rows.sort_by(|a, b| {
            b.cosine
                .total_cmp(&a.cosine)
                .then_with(|| b.matching_peaks.cmp(&a.matching_peaks))
        });
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.file_usi()));
        Self { rows }
    }

    pub fn analog_matches(&self, precursor_mz_tol: f64) -> Vec<AnalogMatch> {
        self.rows
            .iter()
            .filter(|row| row.delta_mass.abs() > precursor_mz_tol)
            .map(|row| AnalogMatch {
                record: row.clone(),
                rounded_delta: (row.delta_mass * 100.0).round() / 100.0,
            })
            .collect()
    }

    pub fn analog_table(&self, precursor_mz_tol: f64) -> Self {
        Self::new(
            self.analog_matches(precursor_mz_tol)
                .into_iter()
                .map(|analog| analog.record)
                .collect(),
        )
    }

    /// Read a persisted match table. `Delta Mass` and `Status` may be absent.
    pub fn read(path: &Utf8Path) -> Result<Self, MasstError> {
        let table_err = |message: String| MasstError::TableRead {
            path: path.to_string(),
            message,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .trim(csv::Trim::All)
            .from_path(path.as_std_path())
            .map_err(|err| table_err(err.to_string()))?;
        let rows = reader
            .deserialize::<MatchRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| table_err(err.to_string()))?;
        Ok(Self { rows })
    }

    /// An empty table is written as a header-only placeholder without the
    /// `Delta Mass` column.
    pub fn write(&self, path: &Utf8Path) -> Result<(), MasstError> {
        if self.rows.is_empty() {
            return write_rows(path, &EMPTY_MATCH_COLUMNS, std::iter::empty::<Vec<String>>());
        }
        write_records(path, &MATCH_COLUMNS, &self.rows)
    }
}

pub fn write_analog_matches(path: &Utf8Path, analogs: &[AnalogMatch]) -> Result<(), MasstError> {
    let mut headers = MATCH_COLUMNS.to_vec();
    headers.push("rounded_delta");
    let rows = analogs.iter().map(|analog| {
        let record = &analog.record;
        vec![
            record.delta_mass.to_string(),
            record.usi.to_string(),
            record.cosine.to_string(),
            record.matching_peaks.to_string(),
            record.status.clone(),
            analog.rounded_delta.to_string(),
        ]
    });
    write_rows(path, &headers, rows)
}

pub fn write_library_matches(path: &Utf8Path, matches: &[LibraryMatch]) -> Result<(), MasstError> {
    write_records(path, &LIBRARY_COLUMNS, matches)
}

pub fn write_datasets(path: &Utf8Path, datasets: &[DatasetSummary]) -> Result<(), MasstError> {
    write_records(path, &["Dataset", "Title", "Matches"], datasets)
}

fn result_rows(response: &Value) -> Option<&Vec<Value>> {
    response.get("results").and_then(Value::as_array)
}

/// Whether the response carries a result list at all. A missing list means
/// the service answered without a usable payload.
pub fn has_results(response: &Value) -> bool {
    result_rows(response).is_some()
}

/// Every parseable row of the response, without any filtering.
pub fn parse_matches(response: &Value) -> MatchTable {
    let Some(rows) = result_rows(response) else {
        debug!("fastMASST response has no results field");
        return MatchTable::default();
    };
    let rows = rows
        .iter()
        .filter_map(|row| match row.as_object() {
            Some(obj) => MatchRecord::from_row(obj),
            None => {
                warn!("dropping non-object match row");
                None
            }
        })
        .collect();
    MatchTable::new(rows)
}

pub fn extract_matches(response: &Value, options: &ExtractOptions) -> MatchTable {
    let mut table = parse_matches(response);
    table.rows.retain(|row| {
        row.matching_peaks >= options.min_matched_signals
            && (options.analog || row.delta_mass.abs() <= options.precursor_mz_tol)
    });
    if options.best_match_per_file {
        table = table.best_match_per_file();
    }
    table
}

pub fn extract_library_matches(response: &Value, options: &ExtractOptions) -> Vec<LibraryMatch> {
    let Some(rows) = result_rows(response) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|row| {
            let record = MatchRecord::from_row(row)?;
            let keep = record.matching_peaks >= options.min_matched_signals
                && (options.analog || record.delta_mass.abs() <= options.precursor_mz_tol);
            keep.then(|| LibraryMatch {
                usi: record.usi.to_string(),
                accession: field_string(row, "GNPSLibraryAccession").unwrap_or_default(),
                cosine: record.cosine,
                matching_peaks: record.matching_peaks,
                compound_name: field_string(row, "CompoundName").unwrap_or_default(),
                adduct: field_string(row, "Adduct").unwrap_or_default(),
                charge: field_string(row, "Charge").unwrap_or_default(),
            })
        })
        .collect()
}

/// One row per dataset listed in `grouped_by_dataset`, with the number of
/// retained matches from that dataset.
pub fn extract_datasets(response: &Value, matches: &MatchTable) -> Vec<DatasetSummary> {
    let mut counts = BTreeMap::<&str, usize>::new();
    for row in matches.rows() {
        *counts.entry(row.dataset_id()).or_default() += 1;
    }

    let Some(groups) = response.get("grouped_by_dataset").and_then(Value::as_array) else {
        debug!("fastMASST response has no dataset grouping");
        return Vec::new();
    };
    groups
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|group| {
            let dataset =
                field_string(group, "Dataset").or_else(|| field_string(group, "dataset"))?;
            let title = field_string(group, "title")
                .or_else(|| field_string(group, "Title"))
                .unwrap_or_default();
            let matches = counts.get(dataset.as_str()).copied().unwrap_or(0);
            (matches > 0).then_some(DatasetSummary {
                dataset,
                title,
                matches,
            })
        })
        .collect()
}

fn field_f64(row: &Map<String, Value>, name: &str) -> Option<f64> {
    let value = match row.get(name)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|value| value.is_finite())
}

fn field_string(row: &Map<String, Value>, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(analog: bool, best: bool) -> ExtractOptions {
        ExtractOptions {
            precursor_mz_tol: 0.05,
            min_matched_signals: 3,
            analog,
            best_match_per_file: best,
        }
    }

    fn response() -> Value {
        json!({
            "results": [
                {"USI": "mzspec:MSV1:a.mzML:scan:1", "Delta Mass": 0.01, "Cosine": 0.9,
                 "Matching Peaks": 5, "Status": "OK"},
                {"USI": "mzspec:MSV1:a.mzML:scan:7", "Delta Mass": 0.0, "Cosine": 0.95,
                 "Matching Peaks": 4, "Status": "OK"},
                {"USI": "mzspec:MSV2:b.mzML:scan:3", "Delta Mass": 14.016, "Cosine": 0.8,
                 "Matching Peaks": 6, "Status": "OK"},
                {"USI": "mzspec:MSV2:c.mzML:scan:3", "Delta Mass": "0.02", "Cosine": "0.75",
                 "Matching Peaks": 2},
                {"USI": "broken", "Cosine": 0.9, "Matching Peaks": 9},
                {"USI": "mzspec:MSV3:d.mzML:scan:1", "Cosine": "n/a", "Matching Peaks": 9}
            ],
            "grouped_by_dataset": [
                {"Dataset": "MSV1", "title": "gut isolates"},
                {"Dataset": "MSV2", "title": "soil"},
                {"Dataset": "MSV9", "title": "unmatched"}
            ]
        })
    }

    #[test]
    fn exact_mode_filters_delta_and_peaks() {
        let table = extract_matches(&response(), &options(false, false));
        assert_eq!(table.len(), 2);
        assert!(table.rows().iter().all(|row| row.dataset_id() == "MSV1"));
    }

    #[test]
    fn analog_mode_skips_delta_filter() {
        let table = extract_matches(&response(), &options(true, false));
        assert_eq!(table.len(), 3);
        let analogs = table.analog_matches(0.05);
        assert_eq!(analogs.len(), 1);
        assert_eq!(analogs[0].rounded_delta, 14.02);
    }

    #[test]
    fn best_match_per_file_keeps_highest_cosine() {
        let table = extract_matches(&response(), &options(false, true));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].cosine, 0.95);
        assert_eq!(table.rows()[0].usi.as_str(), "mzspec:MSV1:a.mzML:scan:7");
    }

    #[test]
    fn peak_count_breaks_cosine_ties() {
        let table = MatchTable::new(vec![
            MatchRecord {
                delta_mass: 0.0,
                usi: "mzspec:MSV1:a.mzML:scan:1".parse().unwrap(),
                cosine: 0.9,
                matching_peaks: 4,
                status: String::new(),
            },
            MatchRecord {
                delta_mass: 0.0,
                usi: "mzspec:MSV1:a.mzML:scan:2".parse().unwrap(),
                cosine: 0.9,
                matching_peaks: 8,
                status: String::new(),
            },
        ]);
        let best = table.best_match_per_file();
        assert_eq!(best.len(), 1);
        assert_eq!(best.rows()[0].matching_peaks, 8);
    }

    #[test]
    fn cosine_rounding_noise_is_clamped() {
        let payload = json!({"results": [
            {"USI": "mzspec:MSV1:a.mzML:scan:1", "Cosine": 1.0000000000000002, "Matching Peaks": 9},
            {"USI": "mzspec:MSV1:b.mzML:scan:1", "Cosine": 1.2, "Matching Peaks": 9}
        ]});
        let table = extract_matches(&payload, &options(true, false));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].cosine, 1.0);
    }

    #[test]
    fn persisted_table_expands_library_ids() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("saved.tsv")).unwrap();
        std::fs::write(
            path.as_std_path(),
            "Delta Mass\tUSI\tCosine\tMatching Peaks\tStatus\n\
             0.0\tCCMSLIB00005883671\t0.9\t5\tOK\n",
        )
        .unwrap();
        let table = MatchTable::read(&path).unwrap();
        assert_eq!(
            table.rows()[0].usi.as_str(),
            "mzspec:GNPS:GNPS-LIBRARY:accession:CCMSLIB00005883671"
        );

        std::fs::write(
            path.as_std_path(),
            "Delta Mass\tUSI\tCosine\tMatching Peaks\tStatus\n0.0\tnot-a-usi\t0.9\t5\tOK\n",
        )
        .unwrap();
        assert!(MatchTable::read(&path).is_err());
    }

    #[test]
    fn missing_results_is_empty_table() {
        let payload = json!({"error": "timeout"});
        assert!(!has_results(&payload));
        assert!(extract_matches(&payload, &options(false, true)).is_empty());
        assert!(extract_library_matches(&payload, &options(false, false)).is_empty());
    }

    #[test]
    fn datasets_count_retained_matches() {
        let payload = response();
        let table = extract_matches(&payload, &options(true, false));
        let datasets = extract_datasets(&payload, &table);
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].dataset, "MSV1");
        assert_eq!(datasets[0].matches, 2);
        assert_eq!(datasets[1].title, "soil");
    }

    #[test]
    fn persisted_table_reads_back() {
        let temp = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("q_matches.tsv");
        let table = extract_matches(&response(), &options(true, false));
        table.write(&path).unwrap();
        assert_eq!(MatchTable::read(&path).unwrap(), table);

        let empty = root.join("empty_matches.tsv");
        MatchTable::default().write(&empty).unwrap();
        assert_eq!(
            std::fs::read_to_string(empty.as_std_path()).unwrap(),
            "USI\tCosine\tMatching Peaks\tStatus\n"
        );
        assert!(MatchTable::read(&empty).unwrap().is_empty());
    }

    #[test]
    fn library_rows_keep_annotations() {
        let payload = json!({"results": [{
            "USI": "mzspec:GNPS:GNPS-LIBRARY:accession:CCMSLIB00005883671",
            "GNPSLibraryAccession": "CCMSLIB00005883671",
            "Cosine": 0.99, "Matching Peaks": 12, "Delta Mass": 0.0,
            "CompoundName": "GABA", "Adduct": "M+H", "Charge": 1
        }]});
        let library = extract_library_matches(&payload, &options(false, false));
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].compound_name, "GABA");
        assert_eq!(library[0].charge, "1");
    }
}
