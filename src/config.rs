use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::SearchDatabase;
use crate::error::MasstError;

pub const DEFAULT_CONFIG_FILE: &str = "masst-tree.json";
pub const DEFAULT_BASE_URL: &str = "https://fastlibrarysearch.ucsd.edu/search";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub search: SearchEntry,
    #[serde(default)]
    pub ontologies: Option<Vec<OntologyEntry>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub database: Option<SearchDatabase>,
    #[serde(default)]
    pub library: Option<SearchDatabase>,
    #[serde(default)]
    pub precursor_mz_tol: Option<f64>,
    #[serde(default)]
    pub mz_tol: Option<f64>,
    #[serde(default)]
    pub min_cos: Option<f64>,
    #[serde(default)]
    pub min_matched_signals: Option<u32>,
    #[serde(default)]
    pub analog: Option<bool>,
    #[serde(default)]
    pub analog_mass_below: Option<f64>,
    #[serde(default)]
    pub analog_mass_above: Option<f64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_expiry_hours: Option<u64>,
    #[serde(default)]
    pub cache_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OntologyEntry {
    Shorthand(String),
    Detailed(OntologyEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OntologyEntryObject {
    pub label: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub tree_file: String,
    pub metadata_file: String,
    pub node_key: String,
    pub metadata_key: String,
}

/// One ontology the matches are folded into.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyDefinition {
    /// Short label, used as `masst_type` and as root name in combined trees.
    pub label: String,
    /// File name component of the per-ontology artifacts.
    pub prefix: String,
    pub tree_file: Utf8PathBuf,
    pub metadata_file: Utf8PathBuf,
    /// Field holding the node id in the tree JSON.
    pub node_key: String,
    /// Column holding the node id in the metadata table.
    pub metadata_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameters {
    pub database: SearchDatabase,
    pub library: SearchDatabase,
    pub precursor_mz_tol: f64,
    pub mz_tol: f64,
    pub min_cos: f64,
    pub min_matched_signals: u32,
    pub analog: bool,
    pub analog_mass_below: f64,
    pub analog_mass_above: f64,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            database: SearchDatabase::MetabolomicspanrepoIndexLatest,
            library: SearchDatabase::Gnpslibrary,
            precursor_mz_tol: 0.05,
            mz_tol: 0.02,
            min_cos: 0.7,
            min_matched_signals: 3,
            analog: false,
            analog_mass_below: 130.0,
            analog_mass_above: 200.0,
        }
    }
}

impl SearchParameters {
    /// Human readable parameter summary embedded into the rendered pages.
    pub fn label(&self) -> String {
        let mut label = format!(
            "min matched signals: {};  min cosine: {};  precursor m/z tolerance: {};  \
             m/z tolerance: {};  analog: {}",
            self.min_matched_signals, self.min_cos, self.precursor_mz_tol, self.mz_tol, self.analog
        );
        if self.analog {
            label.push_str(&format!(
                ";  analogs below m/z:{};  analogs above m/z:{}",
                self.analog_mass_below, self.analog_mass_above
            ));
        }
        label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// `None` disables the on-disk response cache.
    pub cache_expiry_hours: Option<u64>,
    pub cache_dir: Option<Utf8PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 50,
            cache_expiry_hours: Some(48),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub search: SearchParameters,
    pub client: ClientSettings,
    pub ontologies: Vec<OntologyDefinition>,
}

impl ResolvedConfig {
    pub fn ontology(&self, label: &str) -> Result<&OntologyDefinition, MasstError> {
        self.ontologies
            .iter()
            .find(|definition| definition.label == label || definition.prefix == label)
            .ok_or_else(|| MasstError::UnknownOntology(label.to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MasstError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.as_std_path().exists() {
            if path.is_some() {
                return Err(MasstError::MissingConfig(config_path.into_std_path_buf()));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| MasstError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MasstError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MasstError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let data_dir = Utf8PathBuf::from(config.data_dir.as_deref().unwrap_or("data"));

        let defaults = SearchParameters::default();
        let entry = config.search;
        let search = SearchParameters {
            database: entry.database.unwrap_or(defaults.database),
            library: entry.library.unwrap_or(defaults.library),
            precursor_mz_tol: entry.precursor_mz_tol.unwrap_or(defaults.precursor_mz_tol),
            mz_tol: entry.mz_tol.unwrap_or(defaults.mz_tol),
            min_cos: entry.min_cos.unwrap_or(defaults.min_cos),
            min_matched_signals: entry
                .min_matched_signals
                .unwrap_or(defaults.min_matched_signals),
            analog: entry.analog.unwrap_or(defaults.analog),
            analog_mass_below: entry.analog_mass_below.unwrap_or(defaults.analog_mass_below),
            analog_mass_above: entry.analog_mass_above.unwrap_or(defaults.analog_mass_above),
        };

        let client_defaults = ClientSettings::default();
        let client = ClientSettings {
            base_url: entry.base_url.unwrap_or(client_defaults.base_url),
            timeout_secs: entry.timeout_secs.unwrap_or(client_defaults.timeout_secs),
            cache_expiry_hours: match entry.cache_expiry_hours {
                Some(0) => None,
                Some(hours) => Some(hours),
                None => client_defaults.cache_expiry_hours,
            },
            cache_dir: entry.cache_dir.map(Utf8PathBuf::from),
        };

        let ontologies = match config.ontologies {
            None => default_ontologies(&data_dir),
            Some(entries) => entries
                .into_iter()
                .map(|entry| match entry {
                    OntologyEntry::Shorthand(label) => default_ontologies(&data_dir)
                        .into_iter()
                        .find(|definition| definition.label == label)
                        .ok_or(MasstError::UnknownOntology(label)),
                    OntologyEntry::Detailed(obj) => Ok(OntologyDefinition {
                        prefix: obj.prefix.unwrap_or_else(|| obj.label.clone()),
                        label: obj.label,
                        tree_file: resolve_data_path(&data_dir, &obj.tree_file),
                        metadata_file: resolve_data_path(&data_dir, &obj.metadata_file),
                        node_key: obj.node_key,
                        metadata_key: obj.metadata_key,
                    }),
                })
                .collect::<Result<Vec<_>, MasstError>>()?,
        };

        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            search,
            client,
            ontologies,
        })
    }
}

fn resolve_data_path(data_dir: &Utf8Path, file: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from(file);
    if path.is_absolute() {
        path
    } else {
        data_dir.join(path)
    }
}

/// The built-in ontologies in the order they appear in combined trees.
pub fn default_ontologies(data_dir: &Utf8Path) -> Vec<OntologyDefinition> {
    [
        (
            "microbes",
            "microbe",
            "microbe_masst_tree.json",
            "microbe_masst_table.csv",
            "NCBI",
            "Taxa_NCBI",
        ),
        ("plants", "plant", "plant_masst_tree.json", "plant_masst_table.csv", "NCBI", "Taxa_NCBI"),
        ("tissue", "tissue", "tissue_masst_tree.json", "tissue_masst_table.csv", "ID", "ID"),
        ("food", "food", "food_masst_tree.json", "food_masst_table.csv", "name", "node_id"),
        (
            "personalCareProduct",
            "personalCareProduct",
            "personalCareProduct_masst_tree.json",
            "personalCareProduct_masst_table.csv",
            "ID",
            "ID",
        ),
        (
            "microbiome",
            "microbiome",
            "microbiome_masst_tree.json",
            "microbiome_masst_table.tsv",
            "ID",
            "ID",
        ),
    ]
    .into_iter()
    .map(|(label, prefix, tree, table, node_key, metadata_key)| OntologyDefinition {
        label: label.to_string(),
        prefix: prefix.to_string(),
        tree_file: data_dir.join(tree),
        metadata_file: data_dir.join(table),
        node_key: node_key.to_string(),
        metadata_key: metadata_key.to_string(),
    })
    .collect()
}
