use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::aggregate::AggregateTable;
use crate::domain::OntologyKey;
use crate::error::MasstError;

/// Fields computed during enrichment. Stale copies in an input tree are
/// ignored and recomputed.
const DERIVED_FIELDS: [&str; 7] = [
    "children",
    "group_size",
    "matched_size",
    "occurrence_fraction",
    "pie_data",
    "matches_json",
    "masst_type",
];

/// Static ontology node as read from a tree file.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyNode {
    pub fields: Map<String, Value>,
    /// Pool size stored in the tree file, if any.
    pub group_size: Option<u64>,
    pub children: Vec<OntologyNode>,
}

impl OntologyNode {
    pub fn key(&self, node_key: &str) -> Option<OntologyKey> {
        self.fields.get(node_key).and_then(OntologyKey::from_json)
    }

    fn from_json(value: Map<String, Value>) -> Self {
        let mut fields = value;
        let group_size = fields.get("group_size").and_then(|raw| {
            let parsed = parse_count(raw);
            if parsed.is_none() {
                warn!(node = ?fields.get("name"), value = %raw, "ignoring unreadable group_size");
            }
            parsed
        });
        let children = match fields.remove("children") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(children)) => children
                .into_iter()
                .filter_map(|child| match child {
                    Value::Object(child) => Some(Self::from_json(child)),
                    other => {
                        warn!(
                            parent = ?fields.get("name"),
                            child = %other,
                            "skipping non-object child"
                        );
                        None
                    }
                })
                .collect(),
            Some(other) => {
                warn!(
                    node = ?fields.get("name"),
                    children = %other,
                    "children is not a list, treating node as leaf"
                );
                Vec::new()
            }
        };
        for field in DERIVED_FIELDS {
            fields.remove(field);
        }
        Self {
            fields,
            group_size,
            children,
        }
    }

    fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        if let Some(group_size) = self.group_size {
            object.insert("group_size".to_string(), Value::from(group_size));
        }
        object.insert(
            "children".to_string(),
            Value::Array(self.children.iter().map(Self::to_json).collect()),
        );
        Value::Object(object)
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    fn collect_keys(&self, node_key: &str, keys: &mut BTreeSet<OntologyKey>) {
        if let Some(key) = self.key(node_key) {
            keys.insert(key);
        }
        for child in &self.children {
            child.collect_keys(node_key, keys);
        }
    }
}

/// Counts arrive as integers, integral floats or numeric strings.
fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| *float >= 0.0 && float.fract() == 0.0)
                .map(|float| float as u64)
        }),
        Value::String(text) => parse_count(&serde_json::from_str(text.trim()).ok()?),
        _ => None,
    }
}

/// A static ontology with a single root. Loaded fresh for every run and never
/// mutated by enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyTree {
    root: OntologyNode,
}

impl OntologyTree {
    pub fn load(path: &Utf8Path) -> Result<Self, MasstError> {
        let content =
            fs::read_to_string(path.as_std_path()).map_err(|err| MasstError::InvalidOntology {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        Self::parse(&content, path.as_str())
    }

    pub fn parse(content: &str, origin: &str) -> Result<Self, MasstError> {
        let value: Value = serde_json::from_str(content).map_err(|err| MasstError::InvalidOntology {
            path: origin.to_string(),
            message: err.to_string(),
        })?;
        Self::from_value(value, origin)
    }

    pub fn from_value(value: Value, origin: &str) -> Result<Self, MasstError> {
        let invalid = |message: &str| MasstError::InvalidOntology {
            path: origin.to_string(),
            message: message.to_string(),
        };
        let Value::Object(root) = value else {
            return Err(invalid("root is not an object"));
        };
        if !root.contains_key("name") {
            return Err(invalid("root has no name"));
        }
        if !matches!(root.get("children"), Some(Value::Array(_))) {
            return Err(invalid("root has no children list"));
        }
        Ok(Self {
            root: OntologyNode::from_json(root),
        })
    }

    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    pub fn keys(&self, node_key: &str) -> BTreeSet<OntologyKey> {
        let mut keys = BTreeSet::new();
        self.root.collect_keys(node_key, &mut keys);
        keys
    }

    /// Attach aggregates and resolve sizes and statistics on a new tree.
    ///
    /// A node's own aggregate is authoritative. Nodes without one take the sum
    /// of their children. Group sizes resolve the same way, from the size
    /// stored in the tree, then the metadata count of the node's key, then the
    /// children. The root always sums its direct children.
    pub fn enrich(
        &self,
        node_key: &str,
        aggregates: &AggregateTable,
        group_counts: &BTreeMap<OntologyKey, u64>,
    ) -> Result<EnrichedNode, MasstError> {
        let merger = Merger {
            node_key,
            aggregates,
            group_counts,
        };
        let children = self
            .root
            .children
            .iter()
            .map(|child| merger.enrich(child))
            .collect::<Result<Vec<_>, _>>()?;
        let mut fields = self.root.fields.clone();
        merger.fill_missing_key(&mut fields, false);
        Ok(EnrichedNode::summing_children(fields, children))
    }

    /// Rewrite stored group sizes: each node counts the metadata rows carrying
    /// its own key plus the group sizes of its children.
    pub fn update_group_sizes(
        &mut self,
        node_key: &str,
        counts: &BTreeMap<OntologyKey, u64>,
    ) -> u64 {
        fn update(
            node: &mut OntologyNode,
            node_key: &str,
            counts: &BTreeMap<OntologyKey, u64>,
        ) -> u64 {
            let own = node
                .key(node_key)
                .and_then(|key| counts.get(&key).copied())
                .unwrap_or(0);
            let children = node
                .children
                .iter_mut()
                .map(|child| update(child, node_key, counts))
                .sum::<u64>();
            let total = own + children;
            node.group_size = Some(total);
            total
        }
        update(&mut self.root, node_key, counts)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, MasstError> {
        to_json_string(&self.root.to_json(), pretty)
    }
}

struct Merger<'a> {
    node_key: &'a str,
    aggregates: &'a AggregateTable,
    group_counts: &'a BTreeMap<OntologyKey, u64>,
}

impl Merger<'_> {
    fn enrich(&self, node: &OntologyNode) -> Result<EnrichedNode, MasstError> {
        let children = node
            .children
            .iter()
            .map(|child| self.enrich(child))
            .collect::<Result<Vec<_>, _>>()?;

        let key = node.key(self.node_key);
        let mut fields = node.fields.clone();
        if key.is_none() {
            self.fill_missing_key(&mut fields, true);
        }

        let direct = key.as_ref().and_then(|key| self.aggregates.get(key));
        let matched_size = match direct {
            Some(aggregate) => aggregate.matched_size,
            None => children.iter().map(|child| child.matched_size).sum(),
        };
        let group_size = node
            .group_size
            .or_else(|| key.as_ref().and_then(|key| self.group_counts.get(key).copied()))
            .unwrap_or_else(|| children.iter().map(|child| child.group_size).sum());
        let matches_json = direct.map(|aggregate| aggregate.matches_json()).transpose()?;

        let mut enriched = EnrichedNode::new(fields, group_size, matched_size, children);
        enriched.matches_json = matches_json;
        Ok(enriched)
    }

    /// Nodes without a usable key show their name in the key field.
    fn fill_missing_key(&self, fields: &mut Map<String, Value>, report: bool) {
        let missing = fields
            .get(self.node_key)
            .is_none_or(|value| OntologyKey::from_json(value).is_none());
        if !missing {
            return;
        }
        let name = fields.get("name").cloned().unwrap_or_else(|| Value::from(""));
        if report {
            warn!(node = %name, key = self.node_key, "ontology node has no id");
        }
        fields.insert(self.node_key.to_string(), name);
    }
}

/// One slice of the two-entry pie chart attached to every node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub occurrence_fraction: f64,
    pub index: u8,
    pub group_size: u64,
    pub matched_size: u64,
}

fn pie_data(occurrence_fraction: f64, group_size: u64, matched_size: u64) -> [PieSlice; 2] {
    [
        PieSlice {
            occurrence_fraction,
            index: 0,
            group_size,
            matched_size,
        },
        PieSlice {
            occurrence_fraction: 1.0 - occurrence_fraction,
            index: 1,
            group_size,
            matched_size,
        },
    ]
}

fn occurrence_fraction(matched_size: u64, group_size: u64, name: &Value) -> f64 {
    if group_size == 0 {
        return 0.0;
    }
    if matched_size > group_size {
        warn!(node = %name, matched_size, group_size, "more matches than files in group");
        return 1.0;
    }
    matched_size as f64 / group_size as f64
}

/// A node of the enriched output tree. Every size is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedNode {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub group_size: u64,
    pub matched_size: u64,
    pub occurrence_fraction: f64,
    pub pie_data: [PieSlice; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masst_type: Option<String>,
    #[serde(default)]
    pub children: Vec<EnrichedNode>,
}

impl EnrichedNode {
    pub fn new(
        fields: Map<String, Value>,
        group_size: u64,
        matched_size: u64,
        children: Vec<EnrichedNode>,
    ) -> Self {
        let fraction = occurrence_fraction(
            matched_size,
            group_size,
            fields.get("name").unwrap_or(&Value::Null),
        );
        Self {
            fields,
            group_size,
            matched_size,
            occurrence_fraction: fraction,
            pie_data: pie_data(fraction, group_size, matched_size),
            matches_json: None,
            masst_type: None,
            children,
        }
    }

    /// A root whose sizes are the sums over its direct children.
    pub fn summing_children(fields: Map<String, Value>, children: Vec<EnrichedNode>) -> Self {
        let group_size = children.iter().map(|child| child.group_size).sum();
        let matched_size = children.iter().map(|child| child.matched_size).sum();
        Self::new(fields, group_size, matched_size, children)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    pub fn set_name(&mut self, name: &str) {
        self.fields.insert("name".to_string(), Value::from(name));
    }

    /// Tag this node and every descendant.
    pub fn stamp_masst_type(&mut self, label: &str) {
        self.masst_type = Some(label.to_string());
        for child in &mut self.children {
            child.stamp_masst_type(label);
        }
    }

    pub fn find(&self, field: &str, value: &str) -> Option<&EnrichedNode> {
        if self
            .fields
            .get(field)
            .and_then(OntologyKey::from_json)
            .is_some_and(|key| key.as_str() == value)
        {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(field, value))
    }

    pub fn walk(&self) -> Vec<&EnrichedNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, MasstError> {
        let value =
            serde_json::to_value(self).map_err(|err| MasstError::Serialize(err.to_string()))?;
        to_json_string(&value, pretty)
    }
}

fn to_json_string(value: &Value, pretty: bool) -> Result<String, MasstError> {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.map_err(|err| MasstError::Serialize(err.to_string()))
}
