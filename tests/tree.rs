use std::collections::BTreeMap;

use assert_matches::assert_matches;
use serde_json::{Map, json};

use masst_tree::aggregate::{AggregateTable, KeyAggregate};
use masst_tree::combine::{CombineOutcome, combine};
use masst_tree::domain::OntologyKey;
use masst_tree::extract::{MatchRecord, MatchTable};
use masst_tree::tree::{EnrichedNode, OntologyTree};

const TWO_LEAVES: &str = r#"{"NCBI":"1","name":"root","children":[
    {"NCBI":"2","name":"A","children":[]},
    {"NCBI":"3","name":"B","children":[]}
]}"#;

fn key(raw: &str) -> OntologyKey {
    OntologyKey::normalize(raw).unwrap()
}

fn aggregates(entries: &[(&str, u64)]) -> AggregateTable {
    let mut table = AggregateTable::default();
    for (raw, matched_size) in entries {
        table.insert(
            key(raw),
            KeyAggregate {
                matched_size: *matched_size,
                matches: Vec::new(),
            },
        );
    }
    table
}

fn counts(entries: &[(&str, u64)]) -> BTreeMap<OntologyKey, u64> {
    entries.iter().map(|(raw, count)| (key(raw), *count)).collect()
}

fn record(usi: &str, cosine: f64, matching_peaks: u32) -> MatchRecord {
    MatchRecord {
        delta_mass: 0.0,
        usi: usi.parse().unwrap(),
        cosine,
        matching_peaks,
        status: String::new(),
    }
}

/// Three levels with a direct entry on an internal node and a leaf without id.
fn nested_tree() -> OntologyTree {
    OntologyTree::parse(
        r#"{"ID": "root", "name": "life", "children": [
            {"ID": "k1", "name": "kingdom one", "children": [
                {"ID": "p1", "name": "p1", "children": [
                    {"ID": "s1", "name": "s1"},
                    {"ID": "s2", "name": "s2"}
                ]},
                {"ID": "p2", "name": "p2", "children": [{"name": "unnamed leaf"}]}
            ]},
            {"ID": "k2", "name": "kingdom two", "children": [
                {"ID": "s3", "name": "s3", "children": []},
                {"ID": 4, "name": "s4", "group_size": "7"}
            ]}
        ]}"#,
        "nested.json",
    )
    .unwrap()
}

#[test]
fn two_leaf_scenario() {
    let tree = OntologyTree::parse(TWO_LEAVES, "two_leaves.json").unwrap();
    let enriched = tree
        .enrich(
            "NCBI",
            &aggregates(&[("2", 5), ("3", 0)]),
            &counts(&[("2", 10), ("3", 10)]),
        )
        .unwrap();

    let a = enriched.find("NCBI", "2").unwrap();
    assert_eq!((a.matched_size, a.group_size), (5, 10));
    assert_eq!(a.occurrence_fraction, 0.5);
    let b = enriched.find("NCBI", "3").unwrap();
    assert_eq!((b.matched_size, b.group_size), (0, 10));
    assert_eq!(b.occurrence_fraction, 0.0);
    assert_eq!((enriched.matched_size, enriched.group_size), (5, 20));
    assert_eq!(enriched.occurrence_fraction, 0.25);
    assert_eq!(enriched.pie_data[1].occurrence_fraction, 0.75);
}

#[test]
fn leaf_without_id_resolves_to_zero() {
    let tree = OntologyTree::parse(
        r#"{"NCBI":"1","name":"root","children":[{"name":"orphan","children":[]}]}"#,
        "orphan.json",
    )
    .unwrap();
    let enriched = tree
        .enrich("NCBI", &aggregates(&[("1", 3)]), &counts(&[("1", 3)]))
        .unwrap();
    let orphan = &enriched.children[0];
    assert_eq!((orphan.matched_size, orphan.group_size), (0, 0));
    assert_eq!(orphan.occurrence_fraction, 0.0);
    assert_eq!(orphan.fields["NCBI"], json!("orphan"));
    assert_eq!((enriched.matched_size, enriched.group_size), (0, 0));
}

#[test]
fn merging_twice_is_byte_identical() {
    let tree = nested_tree();
    let aggregates = aggregates(&[("s1", 2), ("k2", 4), ("4", 1)]);
    let counts = counts(&[("s1", 5), ("s2", 3), ("s3", 2)]);
    let first = tree.enrich("ID", &aggregates, &counts).unwrap();
    let second = tree.enrich("ID", &aggregates, &counts).unwrap();
    assert_eq!(first.to_json(false).unwrap(), second.to_json(false).unwrap());
    assert_eq!(first.to_json(true).unwrap(), second.to_json(true).unwrap());
}

#[test]
fn sizes_are_conserved_where_no_direct_entry_exists() {
    let tree = nested_tree();
    let aggregates = aggregates(&[("s1", 2), ("s2", 1), ("k2", 4), ("4", 1)]);
    let enriched = tree
        .enrich("ID", &aggregates, &counts(&[("s1", 5), ("s2", 3), ("s3", 2)]))
        .unwrap();

    for node in enriched.walk() {
        if node.children.is_empty() {
            continue;
        }
        let direct = node
            .fields
            .get("ID")
            .and_then(OntologyKey::from_json)
            .is_some_and(|key| aggregates.get(&key).is_some());
        if !direct {
            let children = node.children.iter().map(|child| child.matched_size).sum::<u64>();
            assert_eq!(node.matched_size, children, "{:?}", node.name());
        }
    }

    let k2 = enriched.find("ID", "k2").unwrap();
    assert_eq!(k2.matched_size, 4);
    assert!(k2.matches_json.is_some());
    assert_eq!(enriched.find("ID", "k1").unwrap().matches_json, None);

    let roots_children = &enriched.children;
    assert_eq!(
        enriched.matched_size,
        roots_children.iter().map(|child| child.matched_size).sum::<u64>()
    );
    assert_eq!(
        enriched.group_size,
        roots_children.iter().map(|child| child.group_size).sum::<u64>()
    );
}

#[test]
fn root_sums_children_even_with_direct_entry() {
    let tree = OntologyTree::parse(TWO_LEAVES, "two_leaves.json").unwrap();
    let enriched = tree
        .enrich(
            "NCBI",
            &aggregates(&[("1", 50), ("2", 1)]),
            &counts(&[("1", 100), ("2", 4), ("3", 4)]),
        )
        .unwrap();
    assert_eq!((enriched.matched_size, enriched.group_size), (1, 8));
}

#[test]
fn fractions_stay_within_bounds() {
    let tree = nested_tree();
    // s1 claims more matches than files and p2 has no files.
    let enriched = tree
        .enrich(
            "ID",
            &aggregates(&[("s1", 9), ("p2", 3), ("s3", 1)]),
            &counts(&[("s1", 2), ("s3", 4)]),
        )
        .unwrap();
    for node in enriched.walk() {
        assert!(
            (0.0..=1.0).contains(&node.occurrence_fraction),
            "{:?} has {}",
            node.name(),
            node.occurrence_fraction
        );
        assert!(!node.occurrence_fraction.is_nan());
        if node.group_size == 0 {
            assert_eq!(node.occurrence_fraction, 0.0);
        }
    }
    assert_eq!(enriched.find("ID", "s1").unwrap().occurrence_fraction, 1.0);
    assert_eq!(enriched.find("ID", "p2").unwrap().occurrence_fraction, 0.0);
}

#[test]
fn stored_group_size_beats_metadata_count() {
    let tree = nested_tree();
    let enriched = tree
        .enrich("ID", &aggregates(&[("4", 1)]), &counts(&[("4", 100)]))
        .unwrap();
    let s4 = enriched.find("ID", "4").unwrap();
    assert_eq!((s4.matched_size, s4.group_size), (1, 7));
}

#[test]
fn best_match_per_file_keeps_highest_cosine() {
    let table = MatchTable::new(vec![
        record("mzspec:MSV1:f.mzML:scan:1", 0.9, 10),
        record("mzspec:MSV1:f.mzML:scan:2", 0.95, 4),
        record("mzspec:MSV1:g.mzML:scan:1", 0.8, 4),
    ])
    .best_match_per_file();
    let usis = table
        .rows()
        .iter()
        .map(|row| row.usi.to_string())
        .collect::<Vec<_>>();
    assert_eq!(usis, vec!["mzspec:MSV1:f.mzML:scan:2", "mzspec:MSV1:g.mzML:scan:1"]);
}

#[test]
fn combiner_needs_two_non_empty_trees() {
    let tree = OntologyTree::parse(TWO_LEAVES, "two_leaves.json").unwrap();
    let microbes = tree
        .enrich("NCBI", &aggregates(&[("2", 1)]), &counts(&[("2", 2), ("3", 2)]))
        .unwrap();
    let plants = tree
        .enrich("NCBI", &aggregates(&[("3", 2)]), &counts(&[("2", 1), ("3", 2)]))
        .unwrap();
    let tissue = tree
        .enrich("NCBI", &aggregates(&[("2", 1), ("3", 1)]), &counts(&[("2", 5), ("3", 5)]))
        .unwrap();

    assert_matches!(
        combine([("microbes", &microbes)]),
        CombineOutcome::Skipped { non_empty: 1 }
    );

    let CombineOutcome::Combined(root) = combine([
        ("microbes", &microbes),
        ("plants", &plants),
        ("tissue", &tissue),
    ]) else {
        panic!("three trees should combine");
    };
    assert_eq!(root.children.len(), 3);
    for (child, label) in root.children.iter().zip(["microbes", "plants", "tissue"]) {
        assert_eq!(child.name(), Some(label));
        assert!(child.walk().iter().all(|node| node.masst_type.as_deref() == Some(label)));
    }
    assert_eq!((root.matched_size, root.group_size), (5, 17));
    assert_eq!(root.masst_type, None);
}

#[test]
fn enriched_tree_reads_back_unchanged() {
    let tree = OntologyTree::parse(TWO_LEAVES, "two_leaves.json").unwrap();
    let enriched = tree
        .enrich("NCBI", &aggregates(&[("2", 1), ("3", 3)]), &counts(&[("2", 2), ("3", 6)]))
        .unwrap();
    assert_eq!(enriched.occurrence_fraction, 0.5);
    let json = enriched.to_json(true).unwrap();
    let back: EnrichedNode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, enriched);

    let mut fields = Map::new();
    fields.insert("name".to_string(), json!("x"));
    let leaf = EnrichedNode::new(fields, 0, 0, Vec::new());
    let value = serde_json::to_value(&leaf).unwrap();
    assert_eq!(value["children"], json!([]));
    assert_eq!(value.get("matches_json"), None);
}
