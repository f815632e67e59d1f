use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::OntologyKey;
use crate::error::MasstError;
use crate::metadata::JoinedRow;
use crate::table::write_rows;

/// The part of a match kept on tree nodes for tooltips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProvenance {
    #[serde(rename = "USI")]
    pub usi: String,
    #[serde(rename = "Cosine")]
    pub cosine: f64,
    #[serde(rename = "Matching Peaks")]
    pub matching_peaks: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyAggregate {
    pub matched_size: u64,
    pub matches: Vec<MatchProvenance>,
}

impl KeyAggregate {
    pub fn matches_json(&self) -> Result<String, MasstError> {
        serde_json::to_string(&self.matches).map_err(|err| MasstError::Serialize(err.to_string()))
    }
}

/// Matches grouped by ontology key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTable {
    entries: BTreeMap<OntologyKey, KeyAggregate>,
}

impl AggregateTable {
    /// Group joined rows by their key. Matches keep join order within a key.
    pub fn from_joined(rows: &[JoinedRow<'_>]) -> Self {
        let mut entries = BTreeMap::<OntologyKey, KeyAggregate>::new();
        for row in rows {
            let entry = entries.entry(row.key().clone()).or_default();
            entry.matched_size += 1;
            entry.matches.push(MatchProvenance {
                usi: row.record.usi.to_string(),
                cosine: row.record.cosine,
                matching_peaks: row.record.matching_peaks,
            });
        }
        Self { entries }
    }

    pub fn insert(&mut self, key: OntologyKey, aggregate: KeyAggregate) {
        self.entries.insert(key, aggregate);
    }

    pub fn get(&self, key: &OntologyKey) -> Option<&KeyAggregate> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_matched(&self) -> u64 {
        self.entries.values().map(|entry| entry.matched_size).sum()
    }

    /// One row per key: `<key column>`, `matched_size`, `matches_json`.
    pub fn write_tsv(&self, path: &Utf8Path, key_column: &str) -> Result<(), MasstError> {
        let rows = self
            .entries
            .iter()
            .map(|(key, entry)| {
                Ok(vec![
                    key.to_string(),
                    entry.matched_size.to_string(),
                    entry.matches_json()?,
                ])
            })
            .collect::<Result<Vec<_>, MasstError>>()?;
        write_rows(path, &[key_column, "matched_size", "matches_json"], rows)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::extract::{MatchRecord, MatchTable};
    use crate::metadata::MetadataTable;
    use crate::table::Table;

    fn record(usi: &str, cosine: f64) -> MatchRecord {
        MatchRecord {
            delta_mass: 0.0,
            usi: usi.parse().unwrap(),
            cosine,
            matching_peaks: 4,
            status: "OK".to_string(),
        }
    }

    fn metadata() -> MetadataTable {
        let table = Table {
            path: Utf8PathBuf::from("memory.csv"),
            headers: vec!["file_usi".to_string(), "Taxa_NCBI".to_string()],
            rows: vec![
                vec!["mzspec:MSV1:a.mzML".to_string(), "562".to_string()],
                vec!["mzspec:MSV1:b.mzML".to_string(), "562".to_string()],
                vec!["mzspec:MSV1:c.mzML".to_string(), "1280".to_string()],
            ],
        };
        MetadataTable::from_table(table, "Taxa_NCBI").unwrap()
    }

    #[test]
    fn groups_in_join_order() {
        let meta = metadata();
        let matches = MatchTable::new(vec![
            record("mzspec:MSV1:b.mzML:scan:1", 0.8),
            record("mzspec:MSV1:c.mzML:scan:1", 0.7),
            record("mzspec:MSV1:a.mzML:scan:1", 0.9),
        ]);
        let aggregates = AggregateTable::from_joined(&meta.join(&matches));
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates.total_matched(), 3);

        let ecoli = aggregates.get(&OntologyKey::normalize("562").unwrap()).unwrap();
        assert_eq!(ecoli.matched_size, 2);
        assert_eq!(
            ecoli.matches_json().unwrap(),
            concat!(
                r#"[{"USI":"mzspec:MSV1:b.mzML:scan:1","Cosine":0.8,"Matching Peaks":4},"#,
                r#"{"USI":"mzspec:MSV1:a.mzML:scan:1","Cosine":0.9,"Matching Peaks":4}]"#
            )
        );
    }

    #[test]
    fn empty_join_is_empty_table() {
        let meta = metadata();
        let aggregates = AggregateTable::from_joined(&meta.join(&MatchTable::default()));
        assert!(aggregates.is_empty());
        assert_eq!(aggregates.total_matched(), 0);
    }

    #[test]
    fn counts_tsv_has_one_row_per_key() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("counts.tsv")).unwrap();
        let meta = metadata();
        let matches = MatchTable::new(vec![record("mzspec:MSV1:c.mzML:scan:9", 0.75)]);
        AggregateTable::from_joined(&meta.join(&matches))
            .write_tsv(&path, "Taxa_NCBI")
            .unwrap();
        let table = Table::read(&path).unwrap();
        assert_eq!(table.headers, vec!["Taxa_NCBI", "matched_size", "matches_json"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "1280");
        assert_eq!(table.rows[0][1], "1");
    }
}
