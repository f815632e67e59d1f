use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bundle::{PageData, write_page};
use crate::combine::{CombineOutcome, LoadedOntology, OntologyEnrichment, combine_enrichments};
use crate::config::{OntologyDefinition, ResolvedConfig, SearchParameters};
use crate::domain::Usi;
use crate::error::MasstError;
use crate::extract::{
    ExtractOptions, LibraryMatch, MatchTable, extract_datasets, extract_library_matches,
    extract_matches, has_results, parse_matches, write_analog_matches, write_datasets,
    write_library_matches,
};
use crate::fasst::{FasstClient, SearchQuery};
use crate::fs_util::{path_safe, write_string_atomic};
use crate::metadata::{MetadataCheckReport, MetadataTable, check_metadata};
use crate::summary::{OntologyMatrixSummary, QuantTable, summarize_ontology};
use crate::table::{Table, write_rows};
use crate::tree::{EnrichedNode, OntologyTree};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

/// Reports progress as tracing events.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub pretty: bool,
    pub html_template: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub search: SearchParameters,
    pub best_match_per_file: bool,
    pub output: OutputOptions,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// USI or GNPS library accession.
    pub input: String,
    pub compound_name: Option<String>,
    /// Output prefix, `<out>` in all artifact names.
    pub out: Utf8PathBuf,
}

impl QueryRequest {
    pub fn artifact_prefix(&self) -> String {
        match self.compound_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{}_{}", self.out, name.replace(' ', "_")),
            _ => self.out.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Matched,
    NoMatches,
    EmptyResponse,
    Failed,
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryOutcome::Matched => "matched",
            QueryOutcome::NoMatches => "no_matches",
            QueryOutcome::EmptyResponse => "empty_response",
            QueryOutcome::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OntologySummary {
    pub label: String,
    pub joined_rows: usize,
    pub keys: usize,
    pub matched_size: u64,
    pub group_size: u64,
    pub tree_file: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentSummary {
    pub ontologies: Vec<OntologySummary>,
    pub combined_file: Option<String>,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub input: String,
    pub compound: Option<String>,
    pub outcome: QueryOutcome,
    pub matches: usize,
    pub library_matches: usize,
    pub analog_matches: Option<usize>,
    pub error: Option<String>,
    pub artifacts: Vec<String>,
    pub ontologies: Vec<OntologySummary>,
    pub combined_file: Option<String>,
    pub analog: Option<EnrichmentSummary>,
}

impl QueryResult {
    fn new(request: &QueryRequest, outcome: QueryOutcome) -> Self {
        Self {
            input: request.input.clone(),
            compound: request.compound_name.clone(),
            outcome,
            matches: 0,
            library_matches: 0,
            analog_matches: None,
            error: None,
            artifacts: Vec::new(),
            ontologies: Vec::new(),
            combined_file: None,
            analog: None,
        }
    }

    fn failed(request: &QueryRequest, error: &MasstError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(request, QueryOutcome::Failed)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichResult {
    pub input: String,
    pub matches: usize,
    #[serde(flatten)]
    pub enrichment: EnrichmentSummary,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub table: Utf8PathBuf,
    pub out: Utf8PathBuf,
    pub id_column: String,
    pub name_column: Option<String>,
    pub separator: Option<u8>,
    pub parallel_queries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub started_at: String,
    pub jobs_file: String,
    pub total: usize,
    pub matched: usize,
    pub no_matches: usize,
    pub empty_responses: usize,
    pub failed: usize,
    pub jobs: Vec<QueryResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeUpdateResult {
    pub updated_at: String,
    pub ontology: String,
    pub tree_file: String,
    pub nodes: usize,
    pub group_size: u64,
    pub orphan_rows: usize,
    pub orphans_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// Output prefix of the batch run whose trees are summarized.
    pub batch_out: Utf8PathBuf,
    pub out: Utf8PathBuf,
    pub ontologies: Vec<String>,
    pub min_matches: u64,
    /// MZmine feature quant table, compounds are its row ids.
    pub quant_table: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub created_at: String,
    pub batch_out: String,
    pub quant_features: Option<usize>,
    pub ontologies: Vec<OntologyMatrixSummary>,
}

/// Ontologies prepared for a run. Load failures stay attached to their slot
/// so that the other ontologies still run.
pub struct OntologySet {
    slots: Vec<(OntologyDefinition, Result<LoadedOntology, String>)>,
}

impl OntologySet {
    pub fn load(definitions: &[OntologyDefinition]) -> Self {
        let slots = definitions
            .iter()
            .map(|definition| {
                let loaded = LoadedOntology::load(definition).map_err(|err| {
                    warn!(ontology = %definition.label, error = %err, "failed to load ontology");
                    err.to_string()
                });
                (definition.clone(), loaded)
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Context shared by every page written for one query.
struct PageContext<'a> {
    library_json: String,
    input_label: &'a str,
    usi_label: &'a str,
    params_label: String,
}

pub struct App<F: FasstClient> {
    client: F,
    config: ResolvedConfig,
}

impl<F: FasstClient> App<F> {
    pub fn new(client: F, config: ResolvedConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn query(
        &self,
        request: &QueryRequest,
        options: &QueryOptions,
        sink: &dyn ProgressSink,
    ) -> Result<QueryResult, MasstError> {
        let ontologies = OntologySet::load(&self.config.ontologies);
        self.query_with(request, options, &ontologies, sink)
    }

    /// Run one query against already loaded ontologies. Remote failures are
    /// reported in the outcome, only invalid input and failed writes are
    /// errors.
    pub fn query_with(
        &self,
        request: &QueryRequest,
        options: &QueryOptions,
        ontologies: &OntologySet,
        sink: &dyn ProgressSink,
    ) -> Result<QueryResult, MasstError> {
        let usi: Usi = request.input.parse()?;
        let prefix = request.artifact_prefix();
        let params = &options.search;

        sink.event(ProgressEvent {
            message: format!("query {usi} database={}", params.database),
            elapsed: None,
        });
        let start = Instant::now();
        let response = match self.client.search(&SearchQuery::public_data(usi.clone(), params)) {
            Ok(response) => response,
            Err(err) => {
                warn!(usi = %usi, error = %err, "fastMASST query failed");
                return Ok(QueryResult::failed(request, &err));
            }
        };
        sink.event(ProgressEvent {
            message: format!("response {usi}"),
            elapsed: Some(start.elapsed()),
        });
        if !has_results(&response) {
            warn!(usi = %usi, "fastMASST response without results");
            return Ok(QueryResult::new(request, QueryOutcome::EmptyResponse));
        }

        let extract_options = ExtractOptions {
            precursor_mz_tol: params.precursor_mz_tol,
            min_matched_signals: params.min_matched_signals,
            analog: params.analog,
            best_match_per_file: options.best_match_per_file,
        };
        let matches = extract_matches(&response, &extract_options);
        let mut result = QueryResult::new(request, QueryOutcome::NoMatches);
        result.matches = matches.len();

        let matches_file = Utf8PathBuf::from(format!("{prefix}_matches.tsv"));
        matches.write(&matches_file)?;
        result.artifacts.push(matches_file.to_string());
        if matches.is_empty() {
            debug!(usi = %usi, "no matches");
            return Ok(result);
        }
        result.outcome = QueryOutcome::Matched;

        let library = self.library_matches(&usi, params, &extract_options);
        result.library_matches = library.len();
        if !library.is_empty() {
            let library_file = Utf8PathBuf::from(format!("{prefix}_library.tsv"));
            write_library_matches(&library_file, &library)?;
            result.artifacts.push(library_file.to_string());
        }

        let datasets = extract_datasets(&response, &matches);
        if !datasets.is_empty() {
            let datasets_file = Utf8PathBuf::from(format!("{prefix}_datasets.tsv"));
            write_datasets(&datasets_file, &datasets)?;
            result.artifacts.push(datasets_file.to_string());
        }

        let page = PageContext {
            library_json: serde_json::to_string(&library)
                .map_err(|err| MasstError::Serialize(err.to_string()))?,
            input_label: request.compound_name.as_deref().unwrap_or(&request.input),
            usi_label: usi.as_str(),
            params_label: params.label(),
        };

        if params.analog {
            let analogs = matches.analog_matches(params.precursor_mz_tol);
            result.analog_matches = Some(analogs.len());
            let analog_file = Utf8PathBuf::from(format!("{prefix}_analog_matches.tsv"));
            write_analog_matches(&analog_file, &analogs)?;
            result.artifacts.push(analog_file.to_string());

            let unfiltered_file = Utf8PathBuf::from(format!("{prefix}_unfiltered_matches.tsv"));
            parse_matches(&response).write(&unfiltered_file)?;
            result.artifacts.push(unfiltered_file.to_string());

            let analog_table = matches.analog_table(params.precursor_mz_tol);
            if !analog_table.is_empty() {
                result.analog = Some(self.enrich_into(
                    &format!("{prefix}_analog"),
                    &analog_table,
                    ontologies,
                    &options.output,
                    Some(&page),
                )?);
            }
        }

        let enrichment =
            self.enrich_into(&prefix, &matches, ontologies, &options.output, Some(&page))?;
        result.artifacts.extend(enrichment.artifacts);
        result.ontologies = enrichment.ontologies;
        result.combined_file = enrichment.combined_file;

        sink.event(ProgressEvent {
            message: format!("done {usi} matches={}", result.matches),
            elapsed: Some(start.elapsed()),
        });
        Ok(result)
    }

    fn library_matches(
        &self,
        usi: &Usi,
        params: &SearchParameters,
        options: &ExtractOptions,
    ) -> Vec<LibraryMatch> {
        let library_options = ExtractOptions {
            analog: false,
            best_match_per_file: false,
            ..*options
        };
        match self.client.search(&SearchQuery::library(usi.clone(), params)) {
            Ok(response) => extract_library_matches(&response, &library_options),
            Err(err) => {
                warn!(usi = %usi, error = %err, "library query failed");
                Vec::new()
            }
        }
    }

    /// Enrich a persisted match table offline, optionally restricted to some
    /// ontologies.
    pub fn enrich(
        &self,
        matches_file: &Utf8Path,
        out: &Utf8Path,
        labels: &[String],
        output: &OutputOptions,
        sink: &dyn ProgressSink,
    ) -> Result<EnrichResult, MasstError> {
        let definitions = if labels.is_empty() {
            self.config.ontologies.clone()
        } else {
            labels
                .iter()
                .map(|label| self.config.ontology(label).cloned())
                .collect::<Result<Vec<_>, _>>()?
        };
        let matches = MatchTable::read(matches_file)?;
        sink.event(ProgressEvent {
            message: format!("enrich {matches_file} matches={}", matches.len()),
            elapsed: None,
        });
        let ontologies = OntologySet::load(&definitions);
        let enrichment = self.enrich_into(out.as_str(), &matches, &ontologies, output, None)?;
        Ok(EnrichResult {
            input: matches_file.to_string(),
            matches: matches.len(),
            enrichment,
        })
    }

    /// Fold `matches` into every ontology and write the per-ontology and
    /// combined artifacts under `prefix`.
    fn enrich_into(
        &self,
        prefix: &str,
        matches: &MatchTable,
        ontologies: &OntologySet,
        output: &OutputOptions,
        page: Option<&PageContext<'_>>,
    ) -> Result<EnrichmentSummary, MasstError> {
        let mut summary = EnrichmentSummary::default();
        let mut enrichments = Vec::new();

        for (definition, loaded) in &ontologies.slots {
            let enrichment = match loaded {
                Ok(loaded) => loaded.enrich(matches).map_err(|err| {
                    warn!(ontology = %definition.label, error = %err, "ontology enrichment failed");
                    err.to_string()
                }),
                Err(err) => Err(err.clone()),
            };
            let enrichment = match enrichment {
                Ok(enrichment) => enrichment,
                Err(error) => {
                    summary.ontologies.push(OntologySummary {
                        label: definition.label.clone(),
                        joined_rows: 0,
                        keys: 0,
                        matched_size: 0,
                        group_size: 0,
                        tree_file: None,
                        error: Some(error),
                    });
                    continue;
                }
            };

            let mut tree_file = None;
            if let Some(tree) = &enrichment.tree {
                match write_ontology_artifacts(prefix, &enrichment, tree, output, page) {
                    Ok((json_file, artifacts)) => {
                        tree_file = Some(json_file);
                        summary.artifacts.extend(artifacts);
                    }
                    Err(err) => {
                        warn!(
                            ontology = %enrichment.label,
                            error = %err,
                            "failed to write ontology artifacts"
                        );
                        summary.ontologies.push(OntologySummary {
                            label: enrichment.label.clone(),
                            joined_rows: enrichment.joined_rows,
                            keys: enrichment.aggregates.len(),
                            matched_size: 0,
                            group_size: 0,
                            tree_file: None,
                            error: Some(err.to_string()),
                        });
                        continue;
                    }
                }
            }

            summary.ontologies.push(OntologySummary {
                label: enrichment.label.clone(),
                joined_rows: enrichment.joined_rows,
                keys: enrichment.aggregates.len(),
                matched_size: enrichment.tree.as_ref().map_or(0, |tree| tree.matched_size),
                group_size: enrichment.tree.as_ref().map_or(0, |tree| tree.group_size),
                tree_file,
                error: None,
            });
            enrichments.push(enrichment);
        }

        match combine_enrichments(&enrichments) {
            CombineOutcome::Combined(root) => {
                let json_file = Utf8PathBuf::from(format!("{prefix}_combined.json"));
                let json = root.to_json(output.pretty)?;
                write_string_atomic(&json_file, &format!("{json}\n"))?;
                info!(path = %json_file, "wrote combined tree");
                summary.artifacts.push(json_file.to_string());
                if let (Some(template), Some(page)) = (&output.html_template, page) {
                    let html_file = Utf8PathBuf::from(format!("{prefix}_combined.html"));
                    write_page(template, &html_file, &page_data(&json, page))?;
                    summary.artifacts.push(html_file.to_string());
                }
                summary.combined_file = Some(json_file.to_string());
            }
            CombineOutcome::Skipped { non_empty } => {
                debug!(non_empty, "skipping combined tree");
            }
        }
        Ok(summary)
    }

    /// Run every row of a job table on a bounded pool. Ontologies are loaded
    /// once and shared read-only by all jobs.
    pub fn batch(
        &self,
        request: &BatchRequest,
        options: &QueryOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchResult, MasstError> {
        let table = match request.separator {
            Some(separator) => Table::read_with_delimiter(&request.table, separator)?,
            None => Table::read(&request.table)?,
        };
        let id_index = table.require_column(&request.id_column)?;
        let name_index = request
            .name_column
            .as_deref()
            .map(|column| table.require_column(column))
            .transpose()?;

        let jobs = table
            .rows
            .iter()
            .filter(|row| !row[id_index].is_empty())
            .map(|row| {
                let compound = name_index
                    .map(|index| path_safe(&row[index]))
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| path_safe(&row[id_index]));
                QueryRequest {
                    input: row[id_index].clone(),
                    compound_name: Some(compound),
                    out: request.out.clone(),
                }
            })
            .collect::<Vec<_>>();
        let skipped = table.rows.len() - jobs.len();
        if skipped > 0 {
            warn!(skipped, "job rows without id");
        }

        let ontologies = OntologySet::load(&self.config.ontologies);
        sink.event(ProgressEvent {
            message: format!(
                "batch jobs={} ontologies={} parallel={}",
                jobs.len(),
                ontologies.len(),
                request.parallel_queries
            ),
            elapsed: None,
        });

        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(request.parallel_queries.max(1))
            .build()
            .map_err(|err| MasstError::Filesystem(format!("failed to start worker pool: {err}")))?;
        let results = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    self.query_with(job, options, &ontologies, sink)
                        .unwrap_or_else(|err| {
                            warn!(input = %job.input, error = %err, "job failed");
                            QueryResult::failed(job, &err)
                        })
                })
                .collect::<Vec<_>>()
        });
        sink.event(ProgressEvent {
            message: format!("batch finished jobs={}", results.len()),
            elapsed: Some(start.elapsed()),
        });

        let jobs_file = Utf8PathBuf::from(format!("{}_jobs.tsv", request.out));
        write_rows(
            &jobs_file,
            &["input", "compound", "outcome", "matches", "error"],
            results.iter().map(|result| {
                vec![
                    result.input.clone(),
                    result.compound.clone().unwrap_or_default(),
                    result.outcome.to_string(),
                    result.matches.to_string(),
                    result.error.clone().unwrap_or_default(),
                ]
            }),
        )?;

        let count = |outcome: QueryOutcome| {
            results
                .iter()
                .filter(|result| result.outcome == outcome)
                .count()
        };
        Ok(BatchResult {
            started_at,
            jobs_file: jobs_file.to_string(),
            total: results.len(),
            matched: count(QueryOutcome::Matched),
            no_matches: count(QueryOutcome::NoMatches),
            empty_responses: count(QueryOutcome::EmptyResponse),
            failed: count(QueryOutcome::Failed),
            jobs: results,
        })
    }

    /// Rewrite the stored group sizes of one ontology tree from its metadata.
    pub fn update_tree(
        &self,
        label: &str,
        orphans_file: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<TreeUpdateResult, MasstError> {
        let definition = self.config.ontology(label)?;
        let mut tree = OntologyTree::load(&definition.tree_file)?;
        let metadata = MetadataTable::load(&definition.metadata_file, &definition.metadata_key)?;
        sink.event(ProgressEvent {
            message: format!("update {} rows={}", definition.tree_file, metadata.len()),
            elapsed: None,
        });

        let group_size = tree.update_group_sizes(&definition.node_key, &metadata.group_counts());
        let keys = tree.keys(&definition.node_key);
        let orphans = metadata
            .rows()
            .iter()
            .filter(|row| !keys.contains(&row.key))
            .collect::<Vec<_>>();
        if !orphans.is_empty() {
            warn!(
                rows = orphans.len(),
                ontology = %definition.label,
                "metadata rows without tree node"
            );
        }
        let orphans_written = match orphans_file {
            Some(path) => {
                write_rows(path, &metadata.headers, orphans.iter().map(|row| &row.cells))?;
                Some(path.to_string())
            }
            None => None,
        };

        let json = tree.to_json(true)?;
        write_string_atomic(&definition.tree_file, &format!("{json}\n"))?;
        info!(path = %definition.tree_file, group_size, "updated tree group sizes");

        Ok(TreeUpdateResult {
            updated_at: Utc::now().to_rfc3339(),
            ontology: definition.label.clone(),
            tree_file: definition.tree_file.to_string(),
            nodes: tree.node_count(),
            group_size,
            orphan_rows: orphans.len(),
            orphans_file: orphans_written,
        })
    }

    /// Collect the matched nodes of every compound tree of a batch run into
    /// one presence matrix per ontology.
    pub fn summarize(
        &self,
        request: &SummaryRequest,
        sink: &dyn ProgressSink,
    ) -> Result<SummaryResult, MasstError> {
        let definitions = if request.ontologies.is_empty() {
            self.config.ontologies.clone()
        } else {
            request
                .ontologies
                .iter()
                .map(|label| self.config.ontology(label).cloned())
                .collect::<Result<Vec<_>, _>>()?
        };
        let quant = request
            .quant_table
            .as_deref()
            .map(QuantTable::load)
            .transpose()?;
        sink.event(ProgressEvent {
            message: format!(
                "summary {} ontologies={} min_matches={}",
                request.batch_out,
                definitions.len(),
                request.min_matches
            ),
            elapsed: None,
        });

        let ontologies = definitions
            .iter()
            .map(|definition| {
                summarize_ontology(
                    definition,
                    &request.batch_out,
                    &request.out,
                    request.min_matches,
                    quant.as_ref(),
                )
                .unwrap_or_else(|err| {
                    warn!(ontology = %definition.label, error = %err, "summary failed");
                    OntologyMatrixSummary {
                        label: definition.label.clone(),
                        compounds: 0,
                        nodes: 0,
                        files: Vec::new(),
                        error: Some(err.to_string()),
                    }
                })
            })
            .collect();
        Ok(SummaryResult {
            created_at: Utc::now().to_rfc3339(),
            batch_out: request.batch_out.to_string(),
            quant_features: quant.as_ref().map(QuantTable::len),
            ontologies,
        })
    }

    pub fn check_metadata(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        priority: &[String],
    ) -> Result<MetadataCheckReport, MasstError> {
        check_metadata(input, output, priority)
    }
}

/// Write the counts table, tree JSON and optional page of one ontology.
/// Returns the tree file and every written path.
fn write_ontology_artifacts(
    prefix: &str,
    enrichment: &OntologyEnrichment,
    tree: &EnrichedNode,
    output: &OutputOptions,
    page: Option<&PageContext<'_>>,
) -> Result<(String, Vec<String>), MasstError> {
    let mut artifacts = Vec::new();
    let counts_file = Utf8PathBuf::from(format!("{prefix}_counts_{}.tsv", enrichment.prefix));
    enrichment
        .aggregates
        .write_tsv(&counts_file, &enrichment.metadata_key)?;
    artifacts.push(counts_file.to_string());

    let json_file = Utf8PathBuf::from(format!("{prefix}_{}.json", enrichment.prefix));
    let json = tree.to_json(output.pretty)?;
    write_string_atomic(&json_file, &format!("{json}\n"))?;
    info!(path = %json_file, ontology = %enrichment.label, "wrote enriched tree");
    artifacts.push(json_file.to_string());

    if let (Some(template), Some(page)) = (&output.html_template, page) {
        let html_file = Utf8PathBuf::from(format!("{prefix}_{}.html", enrichment.prefix));
        write_page(template, &html_file, &page_data(&json, page))?;
        artifacts.push(html_file.to_string());
    }
    Ok((json_file.to_string(), artifacts))
}

fn page_data<'a>(tree_json: &'a str, page: &'a PageContext<'a>) -> PageData<'a> {
    PageData {
        tree_json,
        library_json: &page.library_json,
        input_label: page.input_label,
        usi_label: page.usi_label,
        params_label: &page.params_label,
    }
}
