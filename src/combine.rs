use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::aggregate::AggregateTable;
use crate::config::OntologyDefinition;
use crate::domain::OntologyKey;
use crate::error::MasstError;
use crate::extract::MatchTable;
use crate::metadata::MetadataTable;
use crate::tree::{EnrichedNode, OntologyTree};

pub const COMBINED_ROOT_NAME: &str = "root";

/// Tree and metadata of one ontology, read once and shared read-only between
/// enrichment runs.
#[derive(Debug, Clone)]
pub struct LoadedOntology {
    pub definition: OntologyDefinition,
    pub tree: OntologyTree,
    pub metadata: MetadataTable,
    group_counts: BTreeMap<OntologyKey, u64>,
}

impl LoadedOntology {
    pub fn load(definition: &OntologyDefinition) -> Result<Self, MasstError> {
        let tree = OntologyTree::load(&definition.tree_file)?;
        let metadata = MetadataTable::load(&definition.metadata_file, &definition.metadata_key)?;
        Ok(Self::new(definition.clone(), tree, metadata))
    }

    pub fn new(
        definition: OntologyDefinition,
        tree: OntologyTree,
        metadata: MetadataTable,
    ) -> Self {
        let group_counts = metadata.group_counts();
        Self {
            definition,
            tree,
            metadata,
            group_counts,
        }
    }

    /// Join, group and merge `matches` into this ontology. The tree is only
    /// produced when at least one match joins the metadata.
    pub fn enrich(&self, matches: &MatchTable) -> Result<OntologyEnrichment, MasstError> {
        let joined = self.metadata.join(matches);
        let aggregates = AggregateTable::from_joined(&joined);
        let tree = if joined.is_empty() {
            debug!(ontology = %self.definition.label, "no matches in ontology");
            None
        } else {
            debug!(
                ontology = %self.definition.label,
                rows = joined.len(),
                matched = aggregates.total_matched(),
                "enriching ontology"
            );
            Some(
                self.tree
                    .enrich(&self.definition.node_key, &aggregates, &self.group_counts)?,
            )
        };
        Ok(OntologyEnrichment {
            label: self.definition.label.clone(),
            prefix: self.definition.prefix.clone(),
            metadata_key: self.definition.metadata_key.clone(),
            joined_rows: joined.len(),
            aggregates,
            tree,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OntologyEnrichment {
    pub label: String,
    pub prefix: String,
    pub metadata_key: String,
    pub joined_rows: usize,
    pub aggregates: AggregateTable,
    pub tree: Option<EnrichedNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombineOutcome {
    Combined(EnrichedNode),
    /// Fewer than two ontologies had matches.
    Skipped { non_empty: usize },
}

/// Put labelled trees under one synthetic root, in the given order. Every
/// node is tagged with its ontology label and each subtree root is renamed
/// to that label.
pub fn combine<'a, I>(trees: I) -> CombineOutcome
where
    I: IntoIterator<Item = (&'a str, &'a EnrichedNode)>,
{
    let children = trees
        .into_iter()
        .map(|(label, tree)| {
            let mut tree = tree.clone();
            tree.stamp_masst_type(label);
            tree.set_name(label);
            tree
        })
        .collect::<Vec<_>>();
    if children.len() <= 1 {
        return CombineOutcome::Skipped {
            non_empty: children.len(),
        };
    }
    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::from(COMBINED_ROOT_NAME));
    CombineOutcome::Combined(EnrichedNode::summing_children(fields, children))
}

/// Combine the non-empty trees of a set of enrichment runs.
pub fn combine_enrichments<'a, I>(results: I) -> CombineOutcome
where
    I: IntoIterator<Item = &'a OntologyEnrichment>,
{
    combine(
        results
            .into_iter()
            .filter_map(|result| result.tree.as_ref().map(|tree| (result.label.as_str(), tree))),
    )
}
