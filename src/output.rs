use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    BatchResult, EnrichResult, EnrichmentSummary, ProgressEvent, ProgressSink, QueryOutcome,
    QueryResult, SummaryResult, TreeUpdateResult,
};
use crate::metadata::MetadataCheckReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_enrich(result: &EnrichResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tree_update(result: &TreeUpdateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_metadata_check(result: &MetadataCheckReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_summary(result: &SummaryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_query(result: &QueryResult) {
        let label = result.compound.as_deref().unwrap_or(&result.input);
        println!("{label}: {} ({} matches)", result.outcome, result.matches);
        if let Some(error) = &result.error {
            println!("  error: {error}");
        }
        if result.outcome == QueryOutcome::Matched {
            println!("  library matches: {}", result.library_matches);
            if let Some(analogs) = result.analog_matches {
                println!("  analog matches: {analogs}");
            }
            print_enrichment(&EnrichmentSummary {
                ontologies: result.ontologies.clone(),
                combined_file: result.combined_file.clone(),
                artifacts: result.artifacts.clone(),
            });
        }
    }

    pub fn print_enrich(result: &EnrichResult) {
        println!("{}: {} matches", result.input, result.matches);
        print_enrichment(&result.enrichment);
    }

    pub fn print_batch(result: &BatchResult) {
        println!("batch: {} jobs", result.total);
        println!("  matched: {}", result.matched);
        println!("  no matches: {}", result.no_matches);
        println!("  empty responses: {}", result.empty_responses);
        println!("  failed: {}", result.failed);
        println!("  jobs: {}", result.jobs_file);
    }

    pub fn print_tree_update(result: &TreeUpdateResult) {
        println!(
            "{}: {} nodes, group size {} -> {}",
            result.ontology, result.nodes, result.group_size, result.tree_file
        );
        if result.orphan_rows > 0 {
            println!("  metadata rows without node: {}", result.orphan_rows);
        }
        if let Some(path) = &result.orphans_file {
            println!("  orphans: {path}");
        }
    }

    pub fn print_metadata_check(result: &MetadataCheckReport) {
        println!(
            "{}: kept {} of {} rows -> {}",
            result.input, result.kept, result.rows, result.output
        );
        if let Some(path) = &result.duplicates_file {
            println!("  duplicates ({} rows): {path}", result.duplicate_rows);
        }
    }

    pub fn print_summary(result: &SummaryResult) {
        println!("summary of {}", result.batch_out);
        if let Some(features) = result.quant_features {
            println!("  quant features: {features}");
        }
        for ontology in &result.ontologies {
            if let Some(error) = &ontology.error {
                println!("  {}: error: {error}", ontology.label);
                continue;
            }
            println!(
                "  {}: {} nodes across {} compounds",
                ontology.label, ontology.nodes, ontology.compounds
            );
            for file in &ontology.files {
                println!("    -> {file}");
            }
        }
    }
}

fn print_enrichment(summary: &EnrichmentSummary) {
    for ontology in &summary.ontologies {
        match (&ontology.error, &ontology.tree_file) {
            (Some(error), _) => println!("  {}: error: {error}", ontology.label),
            (None, Some(path)) => println!(
                "  {}: {}/{} matched ({} keys) -> {path}",
                ontology.label, ontology.matched_size, ontology.group_size, ontology.keys
            ),
            (None, None) => println!("  {}: no matches", ontology.label),
        }
    }
    if let Some(path) = &summary.combined_file {
        println!("  combined -> {path}");
    }
}
