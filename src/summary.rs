use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::OntologyDefinition;
use crate::domain::OntologyKey;
use crate::error::MasstError;
use crate::table::{Table, write_rows};
use crate::tree::EnrichedNode;

const QUANT_ID_COLUMN: &str = "row ID";
const PEAK_AREA_SUFFIX: &str = " Peak area";
const ANALOG_SUFFIX: &str = "_analog";
/// Relative intensity (percent of the row maximum) that counts as detected.
const PRESENCE_THRESHOLD: f64 = 0.01;

/// A node of one compound's tree with enough matches to be reported.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryNode {
    pub key: String,
    pub name: String,
    pub rank: String,
    pub level: u32,
    pub group_size: u64,
    pub matched_size: u64,
}

/// Nodes below the root with at least `min_matches` matches. A node that
/// falls short hides its whole subtree.
pub fn matched_nodes(tree: &EnrichedNode, node_key: &str, min_matches: u64) -> Vec<SummaryNode> {
    let mut nodes = Vec::new();
    for child in &tree.children {
        collect_matched(child, node_key, min_matches, 1, &mut nodes);
    }
    nodes
}

fn collect_matched(
    node: &EnrichedNode,
    node_key: &str,
    min_matches: u64,
    level: u32,
    nodes: &mut Vec<SummaryNode>,
) {
    if node.matched_size < min_matches {
        return;
    }
    nodes.push(SummaryNode {
        key: node
            .fields
            .get(node_key)
            .and_then(OntologyKey::from_json)
            .map(|key| key.to_string())
            .unwrap_or_default(),
        name: node.name().unwrap_or_default().to_string(),
        rank: node.fields.get("Rank").map(cell_text).unwrap_or_default(),
        level,
        group_size: node.group_size,
        matched_size: node.matched_size,
    });
    for child in &node.children {
        collect_matched(child, node_key, min_matches, level + 1, nodes);
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Enriched trees of one ontology written by a batch run, keyed by compound.
///
/// `batch_out` is the output prefix the batch ran with, so trees are named
/// `<batch_out>_<compound>_<prefix>.json`. Analog trees are skipped.
pub fn find_compound_trees(
    batch_out: &Utf8Path,
    prefix: &str,
) -> Result<BTreeMap<String, Utf8PathBuf>, MasstError> {
    let stem = batch_out
        .file_name()
        .ok_or_else(|| MasstError::Filesystem(format!("no file name in {batch_out}")))?;
    let dir = match batch_out.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let head = format!("{stem}_");
    let tail = format!("_{prefix}.json");

    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| MasstError::Filesystem(format!("read {dir}: {err}")))?;
    let mut trees = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|err| MasstError::Filesystem(format!("read {dir}: {err}")))?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        let Some(compound) = file_name
            .strip_prefix(&head)
            .and_then(|rest| rest.strip_suffix(&tail))
        else {
            continue;
        };
        if compound.is_empty() || compound.ends_with(ANALOG_SUFFIX) {
            continue;
        }
        trees.insert(compound.to_string(), dir.join(&file_name));
    }
    Ok(trees)
}

pub fn load_enriched(path: &Utf8Path) -> Result<EnrichedNode, MasstError> {
    let invalid = |message: String| MasstError::InvalidOntology {
        path: path.to_string(),
        message,
    };
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| invalid(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| invalid(err.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
struct MatrixRow {
    node: SummaryNode,
    values: BTreeMap<usize, u64>,
}

/// Ontology nodes (rows) by compounds (columns). A cell is 1 when the
/// compound matched the node, or its matched size when built with counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMatrix {
    node_key: String,
    compounds: Vec<String>,
    rows: BTreeMap<String, MatrixRow>,
}

impl PresenceMatrix {
    pub fn build<'a, I>(node_key: &str, compounds: I, counts: bool) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [SummaryNode])>,
    {
        let mut matrix = Self {
            node_key: node_key.to_string(),
            compounds: Vec::new(),
            rows: BTreeMap::new(),
        };
        for (compound, nodes) in compounds {
            if nodes.is_empty() {
                continue;
            }
            let column = matrix.compounds.len();
            matrix.compounds.push(compound.to_string());
            let mut seen = HashSet::new();
            for node in nodes {
                if !seen.insert(node.key.as_str()) {
                    continue;
                }
                let value = if counts { node.matched_size } else { 1 };
                matrix
                    .rows
                    .entry(node.key.clone())
                    .or_insert_with(|| MatrixRow {
                        node: node.clone(),
                        values: BTreeMap::new(),
                    })
                    .values
                    .insert(column, value);
            }
        }
        matrix
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    pub fn compounds(&self) -> &[String] {
        &self.compounds
    }

    pub fn value(&self, key: &str, compound: &str) -> u64 {
        let Some(column) = self.compounds.iter().position(|name| name == compound) else {
            return 0;
        };
        self.rows
            .get(key)
            .and_then(|row| row.values.get(&column))
            .copied()
            .unwrap_or(0)
    }

    fn index_headers(&self) -> Vec<String> {
        [self.node_key.as_str(), "Name", "Rank", "group_size", "Level"]
            .iter()
            .map(|header| header.to_string())
            .collect()
    }

    fn index_cells(row: &MatrixRow) -> Vec<String> {
        vec![
            row.node.key.clone(),
            row.node.name.clone(),
            row.node.rank.clone(),
            row.node.group_size.to_string(),
            row.node.level.to_string(),
        ]
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), MasstError> {
        let mut headers = self.index_headers();
        headers.extend(self.compounds.iter().cloned());
        let rows = self.rows.values().map(|row| {
            let mut cells = Self::index_cells(row);
            cells.extend((0..self.compounds.len()).map(|column| {
                row.values.get(&column).copied().unwrap_or(0).to_string()
            }));
            cells
        });
        write_rows(path, &headers, rows)
    }

    /// Spread every node onto the samples of a feature quant table: each
    /// compound column is a feature id and contributes its intensities to
    /// every node it matched.
    pub fn project(&self, quant: &QuantTable, binary: bool) -> SampleMatrix {
        let mut missing = Vec::new();
        let features = self
            .compounds
            .iter()
            .map(|compound| {
                let feature = OntologyKey::normalize(compound)
                    .and_then(|id| quant.intensities.get(id.as_str()));
                if feature.is_none() {
                    missing.push(compound.as_str());
                }
                feature
            })
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            warn!(features = ?missing, "compounds without a quant table row");
        }

        let rows = self
            .rows
            .values()
            .map(|row| {
                let mut sums = vec![0.0; quant.samples.len()];
                for (column, value) in &row.values {
                    let Some(intensities) = features[*column] else {
                        continue;
                    };
                    for (sum, intensity) in sums.iter_mut().zip(intensities) {
                        let intensity = match binary {
                            true if *intensity >= PRESENCE_THRESHOLD => 1.0,
                            true => 0.0,
                            false => *intensity,
                        };
                        *sum += *value as f64 * intensity;
                    }
                }
                (Self::index_cells(row), sums)
            })
            .collect::<Vec<_>>();
        let mut headers = self.index_headers();
        headers.extend(quant.samples.iter().cloned());
        SampleMatrix { headers, rows }
    }
}

/// Ontology nodes by samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    headers: Vec<String>,
    rows: Vec<(Vec<String>, Vec<f64>)>,
}

impl SampleMatrix {
    pub fn sample_values(&self, key: &str) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|(index, _)| index.first().is_some_and(|cell| cell == key))
            .map(|(_, values)| values.as_slice())
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), MasstError> {
        let rows = self.rows.iter().map(|(index, values)| {
            let mut cells = index.clone();
            cells.extend(values.iter().map(|value| value.to_string()));
            cells
        });
        write_rows(path, &self.headers, rows)
    }
}

/// Feature intensities per sample from an MZmine quant table, scaled to the
/// percentage of each feature's highest intensity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantTable {
    pub samples: Vec<String>,
    intensities: HashMap<String, Vec<f64>>,
}

impl QuantTable {
    pub fn load(path: &Utf8Path) -> Result<Self, MasstError> {
        Self::from_table(Table::read(path)?)
    }

    pub fn from_table(table: Table) -> Result<Self, MasstError> {
        let id_index = table.require_column(QUANT_ID_COLUMN)?;
        let sample_columns = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(index, header)| {
                header
                    .strip_suffix(PEAK_AREA_SUFFIX)
                    .map(|sample| (index, sample.to_string()))
            })
            .collect::<Vec<_>>();
        if sample_columns.is_empty() {
            warn!(path = %table.path, "quant table without peak area columns");
        }

        let mut intensities = HashMap::new();
        for row in &table.rows {
            let Some(id) = OntologyKey::normalize(&row[id_index]) else {
                continue;
            };
            let areas = sample_columns
                .iter()
                .map(|(index, _)| row[*index].parse::<f64>().unwrap_or(0.0))
                .collect::<Vec<_>>();
            let max = areas.iter().copied().fold(0.0, f64::max);
            let relative = areas
                .iter()
                .map(|area| if max > 0.0 { area / max * 100.0 } else { 0.0 })
                .collect::<Vec<_>>();
            intensities.entry(id.to_string()).or_insert(relative);
        }
        debug!(path = %table.path, features = intensities.len(), "loaded quant table");
        Ok(Self {
            samples: sample_columns.into_iter().map(|(_, sample)| sample).collect(),
            intensities,
        })
    }

    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OntologyMatrixSummary {
    pub label: String,
    pub compounds: usize,
    pub nodes: usize,
    pub files: Vec<String>,
    pub error: Option<String>,
}

/// Build the presence matrix of one ontology over all compound trees of a
/// batch and write it, plus the sample projections when a quant table is
/// given. Writes nothing when no node reaches `min_matches`.
pub fn summarize_ontology(
    definition: &OntologyDefinition,
    batch_out: &Utf8Path,
    out: &Utf8Path,
    min_matches: u64,
    quant: Option<&QuantTable>,
) -> Result<OntologyMatrixSummary, MasstError> {
    let trees = find_compound_trees(batch_out, &definition.prefix)?;
    let mut per_compound = Vec::with_capacity(trees.len());
    for (compound, path) in &trees {
        let tree = load_enriched(path)?;
        let nodes = matched_nodes(&tree, &definition.node_key, min_matches);
        per_compound.push((compound.as_str(), nodes));
    }
    let matrix = PresenceMatrix::build(
        &definition.node_key,
        per_compound
            .iter()
            .map(|(compound, nodes)| (*compound, nodes.as_slice())),
        false,
    );

    let mut summary = OntologyMatrixSummary {
        label: definition.label.clone(),
        compounds: matrix.compounds().len(),
        nodes: matrix.node_count(),
        files: Vec::new(),
        error: None,
    };
    if matrix.is_empty() {
        debug!(ontology = %definition.label, trees = trees.len(), "no matched nodes to summarize");
        return Ok(summary);
    }

    let base = format!("{out}_{}", definition.prefix);
    let matches_file = Utf8PathBuf::from(format!("{base}_spectral_matches.csv"));
    matrix.write(&matches_file)?;
    info!(path = %matches_file, nodes = matrix.node_count(), "wrote spectral match summary");
    summary.files.push(matches_file.to_string());

    if let Some(quant) = quant {
        for (binary, suffix) in [(true, "samples_binary"), (false, "samples_row_normalized")] {
            let path = Utf8PathBuf::from(format!("{base}_{suffix}.csv"));
            matrix.project(quant, binary).write(&path)?;
            summary.files.push(path.to_string());
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn tree() -> EnrichedNode {
        serde_json::from_value(json!({
            "name": "root", "NCBI": 1, "group_size": 10, "matched_size": 3,
            "occurrence_fraction": 0.3,
            "pie_data": [
                {"occurrence_fraction": 0.3, "index": 0, "group_size": 10, "matched_size": 3},
                {"occurrence_fraction": 0.7, "index": 1, "group_size": 10, "matched_size": 3}
            ],
            "children": [
                node("Bacteria", 2, "superkingdom", 6, 3, vec![
                    node("E. coli", 562, "species", 4, 3, vec![]),
                    node("B. subtilis", 1423, "species", 2, 0, vec![]),
                ]),
                node("Fungi", 4751, "kingdom", 4, 0, vec![
                    node("Yeast", 4932, "species", 4, 2, vec![]),
                ]),
            ]
        }))
        .unwrap()
    }

    fn node(
        name: &str,
        id: u64,
        rank: &str,
        group_size: u64,
        matched_size: u64,
        children: Vec<Value>,
    ) -> Value {
        let fraction = matched_size as f64 / group_size as f64;
        json!({
            "name": name, "NCBI": id, "Rank": rank,
            "group_size": group_size, "matched_size": matched_size,
            "occurrence_fraction": fraction,
            "pie_data": [
                {"occurrence_fraction": fraction, "index": 0,
                 "group_size": group_size, "matched_size": matched_size},
                {"occurrence_fraction": 1.0 - fraction, "index": 1,
                 "group_size": group_size, "matched_size": matched_size}
            ],
            "children": children
        })
    }

    fn summary_node(key: &str, matched_size: u64) -> SummaryNode {
        SummaryNode {
            key: key.to_string(),
            name: format!("node {key}"),
            rank: String::new(),
            level: 1,
            group_size: 10,
            matched_size,
        }
    }

    #[test]
    fn unmatched_nodes_hide_their_subtree() {
        let nodes = matched_nodes(&tree(), "NCBI", 1);
        let keys = nodes.iter().map(|node| node.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["2", "562"]);
        assert_eq!(nodes[1].level, 2);
        assert_eq!(nodes[1].rank, "species");
        assert_eq!(nodes[1].name, "E. coli");

        let everything = matched_nodes(&tree(), "NCBI", 0);
        assert_eq!(everything.len(), 5);
        assert!(matched_nodes(&tree(), "NCBI", 4).is_empty());
    }

    #[test]
    fn matrix_marks_presence_per_compound() {
        let first = vec![summary_node("562", 3), summary_node("2", 3)];
        let second = vec![summary_node("562", 1)];
        let none = Vec::new();
        let matrix = PresenceMatrix::build(
            "NCBI",
            [("12", first.as_slice()), ("13", second.as_slice()), ("14", none.as_slice())],
            false,
        );
        assert_eq!(matrix.compounds(), ["12", "13"]);
        assert_eq!(matrix.node_count(), 2);
        assert_eq!(matrix.value("562", "13"), 1);
        assert_eq!(matrix.value("2", "13"), 0);

        let counts = PresenceMatrix::build("NCBI", [("12", first.as_slice())], true);
        assert_eq!(counts.value("562", "12"), 3);
    }

    #[test]
    fn quant_projection_sums_matched_features() {
        let table = Table {
            path: Utf8PathBuf::from("quant.csv"),
            headers: ["row ID", "row m/z", "s1.mzML Peak area", "s2.mzML Peak area"]
                .iter()
                .map(|header| header.to_string())
                .collect(),
            rows: vec![
                vec!["12".into(), "150.1".into(), "50".into(), "200".into()],
                vec!["13".into(), "180.2".into(), "0".into(), "40".into()],
            ],
        };
        let quant = QuantTable::from_table(table).unwrap();
        assert_eq!(quant.samples, vec!["s1.mzML", "s2.mzML"]);

        let first = vec![summary_node("562", 3)];
        let second = vec![summary_node("562", 1), summary_node("2", 1)];
        let matrix = PresenceMatrix::build(
            "NCBI",
            [("12", first.as_slice()), ("13", second.as_slice())],
            false,
        );

        let normalized = matrix.project(&quant, false);
        assert_eq!(normalized.sample_values("562"), Some([25.0, 200.0].as_slice()));
        assert_eq!(normalized.sample_values("2"), Some([0.0, 100.0].as_slice()));

        let binary = matrix.project(&quant, true);
        assert_eq!(binary.sample_values("562"), Some([1.0, 2.0].as_slice()));
    }

    #[test]
    fn quant_table_needs_row_ids() {
        let table = Table {
            path: Utf8PathBuf::from("quant.csv"),
            headers: vec!["id".to_string()],
            rows: Vec::new(),
        };
        assert_matches!(
            QuantTable::from_table(table),
            Err(MasstError::MissingColumn { .. })
        );
    }

    #[test]
    fn compound_trees_are_found_by_name() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for name in [
            "run_12_microbe.json",
            "run_gamma_amino_microbe.json",
            "run_12_analog_microbe.json",
            "run_12_food.json",
            "run_12_counts_microbe.tsv",
            "run_microbe.json",
            "other_13_microbe.json",
        ] {
            fs::write(root.join(name).as_std_path(), "{}").unwrap();
        }
        let trees = find_compound_trees(&root.join("run"), "microbe").unwrap();
        assert_eq!(trees.keys().collect::<Vec<_>>(), vec!["12", "gamma_amino"]);
        assert_eq!(trees["12"], root.join("run_12_microbe.json"));
    }
}
