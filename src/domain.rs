use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MasstError;

const LIBRARY_USI_PREFIX: &str = "mzspec:GNPS:GNPS-LIBRARY:accession:";
const SPECTRUM_INDEX_TYPES: [&str; 3] = ["scan", "index", "nativeId"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SearchDatabase {
    MetabolomicspanrepoIndexLatest,
    GnpsdataIndex,
    Gnpslibrary,
    MassivedataIndex,
    MassivekbIndex,
}

impl SearchDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDatabase::MetabolomicspanrepoIndexLatest => "metabolomicspanrepo_index_latest",
            SearchDatabase::GnpsdataIndex => "gnpsdata_index",
            SearchDatabase::Gnpslibrary => "gnpslibrary",
            SearchDatabase::MassivedataIndex => "massivedata_index",
            SearchDatabase::MassivekbIndex => "massivekb_index",
        }
    }
}

impl fmt::Display for SearchDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SearchDatabase {
    type Err = MasstError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "metabolomicspanrepo_index_latest" => {
                Ok(SearchDatabase::MetabolomicspanrepoIndexLatest)
            }
            "gnpsdata_index" => Ok(SearchDatabase::GnpsdataIndex),
            "gnpslibrary" => Ok(SearchDatabase::Gnpslibrary),
            "massivedata_index" => Ok(SearchDatabase::MassivedataIndex),
            "massivekb_index" => Ok(SearchDatabase::MassivekbIndex),
            _ => Err(MasstError::InvalidDatabase(value.to_string())),
        }
    }
}

/// A Universal Spectrum Identifier, `mzspec:<dataset>:<file>[:scan:<n>]`.
///
/// GNPS library accessions (`CCMSLIB...`) are accepted and expanded to their
/// library USI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Usi(String);

impl Usi {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn dataset(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    pub fn file_usi(&self) -> FileUsi {
        FileUsi::from_usi_str(&self.0)
    }
}

impl fmt::Display for Usi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Usi {
    type Error = MasstError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Usi {
    type Err = MasstError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.starts_with("CCMS") {
            return Ok(Self(format!("{LIBRARY_USI_PREFIX}{trimmed}")));
        }
        let segments = trimmed.split(':').collect::<Vec<_>>();
        let is_valid = segments.len() >= 3
            && segments[0] == "mzspec"
            && segments[1..].iter().all(|segment| !segment.is_empty());
        if !is_valid {
            return Err(MasstError::InvalidUsi(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A USI truncated to `mzspec:<dataset>:<file stem>`, the join key between
/// matches and per-file metadata. Scan, directories and file extension are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct FileUsi(String);

impl FileUsi {
    fn from_usi_str(usi: &str) -> Self {
        let mut segments = usi.split(':').collect::<Vec<_>>();
        if segments.len() >= 5 && SPECTRUM_INDEX_TYPES.contains(&segments[segments.len() - 2]) {
            segments.truncate(segments.len() - 2);
        }
        let dataset = segments.get(1).copied().unwrap_or_default();
        let file = segments.last().copied().unwrap_or_default();
        Self(format!("mzspec:{dataset}:{}", file_stem(file)))
    }

    /// Build the file USI of a metadata row that only lists dataset and file
    /// name.
    pub fn from_dataset_file(dataset: &str, filename: &str) -> Result<Self, MasstError> {
        let dataset = dataset.trim();
        let stem = file_stem(filename.trim());
        if dataset.is_empty() || stem.is_empty() {
            return Err(MasstError::InvalidUsi(format!("{dataset}:{filename}")));
        }
        Ok(Self(format!("mzspec:{dataset}:{stem}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn file_stem(file: &str) -> &str {
    Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file)
}

impl fmt::Display for FileUsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FileUsi {
    type Error = MasstError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for FileUsi {
    type Err = MasstError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let usi: Usi = value.parse()?;
        Ok(usi.file_usi())
    }
}

/// Identifier of an ontology node as it appears in trees and metadata tables.
///
/// Trees store ids as JSON numbers or strings and metadata tables frequently
/// carry them as floats (`562.0`), so every comparison goes through
/// [`OntologyKey::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OntologyKey(String);

impl OntologyKey {
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(integral) = trimmed.strip_suffix(".0") {
            if !integral.is_empty() && integral.chars().all(|ch| ch.is_ascii_digit()) {
                return Some(Self(integral.to_string()));
            }
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Self::normalize(text),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Some(Self(int.to_string()))
                } else if let Some(int) = number.as_u64() {
                    Some(Self(int.to_string()))
                } else {
                    Self::normalize(&number.to_string())
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OntologyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
