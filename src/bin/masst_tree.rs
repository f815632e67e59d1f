use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use masst_tree::app::{
    App, BatchRequest, OutputOptions, ProgressSink, QueryOptions, QueryRequest, SummaryRequest,
    TracingSink,
};
use masst_tree::config::{ConfigLoader, ResolvedConfig, SearchParameters};
use masst_tree::domain::SearchDatabase;
use masst_tree::error::MasstError;
use masst_tree::fasst::{FasstClient, FasstHttpClient, SearchQuery};
use masst_tree::output::{HumanOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "masst-tree")]
#[command(about = "Run fastMASST searches and fold the matches into ontology trees")]
#[command(version, author)]
struct Cli {
    /// Print a JSON summary on stdout instead of the human summary
    #[arg(long, global = true)]
    json: bool,

    /// Config file, defaults to masst-tree.json when present
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search one USI or library id and write enriched trees")]
    Query(QueryArgs),
    #[command(about = "Search every row of a job table")]
    Batch(BatchArgs),
    #[command(about = "Enrich trees from a saved match table without searching")]
    Enrich(EnrichArgs),
    #[command(about = "Summarize matched ontology nodes across the compounds of a batch")]
    Summary(SummaryArgs),
    #[command(about = "Maintain ontology tree files")]
    Tree(TreeArgs),
    #[command(about = "Maintain metadata tables")]
    Metadata(MetadataArgs),
}

#[derive(Args, Clone)]
struct SearchArgs {
    #[arg(long)]
    database: Option<SearchDatabase>,

    #[arg(long)]
    library: Option<SearchDatabase>,

    #[arg(long)]
    precursor_mz_tol: Option<f64>,

    #[arg(long)]
    mz_tol: Option<f64>,

    #[arg(long)]
    min_cos: Option<f64>,

    #[arg(long)]
    min_matched_signals: Option<u32>,

    /// Search for analogs within the analog mass window
    #[arg(long)]
    analog: bool,

    #[arg(long)]
    analog_mass_below: Option<f64>,

    #[arg(long)]
    analog_mass_above: Option<f64>,

    /// Keep every matching scan instead of the best match per file
    #[arg(long)]
    all_matches_per_file: bool,

    /// Skip the on-disk response cache
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args, Clone)]
struct PageArgs {
    /// HTML template with data placeholders
    #[arg(long)]
    html_template: Option<Utf8PathBuf>,

    /// Indent the tree JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// USI or GNPS library id (CCMSLIB...)
    input: String,

    #[arg(long)]
    out: Utf8PathBuf,

    #[arg(long)]
    compound_name: Option<String>,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// CSV or TSV table with one job per row
    table: Utf8PathBuf,

    #[arg(long)]
    out: Utf8PathBuf,

    #[arg(long, default_value = "USI")]
    id_column: String,

    #[arg(long, default_value = "Compound")]
    name_column: String,

    /// Column separator, `tab` or a single character
    #[arg(long, value_parser = parse_separator)]
    separator: Option<u8>,

    #[arg(long, default_value_t = 10)]
    parallel_queries: usize,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args)]
struct EnrichArgs {
    /// Match table written by a previous query
    matches: Utf8PathBuf,

    #[arg(long)]
    out: Utf8PathBuf,

    /// Restrict to these ontologies, all configured ones by default
    #[arg(long = "ontology")]
    ontologies: Vec<String>,

    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct SummaryArgs {
    /// Output prefix the batch ran with
    batch_out: Utf8PathBuf,

    #[arg(long)]
    out: Utf8PathBuf,

    /// Restrict to these ontologies, all configured ones by default
    #[arg(long = "ontology")]
    ontologies: Vec<String>,

    /// Report nodes with at least this many matches
    #[arg(long, default_value_t = 1)]
    min_matches: u64,

    /// MZmine quant table to project the matches onto its samples
    #[arg(long)]
    quant_table: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct TreeArgs {
    #[command(subcommand)]
    command: TreeCommand,
}

#[derive(Subcommand)]
enum TreeCommand {
    #[command(about = "Rewrite group sizes of a tree from its metadata table")]
    Update(TreeUpdateArgs),
}

#[derive(Args)]
struct TreeUpdateArgs {
    #[arg(long)]
    ontology: String,

    /// Write metadata rows without a tree node to this table
    #[arg(long)]
    orphans: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct MetadataArgs {
    #[command(subcommand)]
    command: MetadataCommand,
}

#[derive(Subcommand)]
enum MetadataCommand {
    #[command(about = "Add file USIs, report and drop duplicated files")]
    Check(MetadataCheckArgs),
}

#[derive(Args)]
struct MetadataCheckArgs {
    table: Utf8PathBuf,

    #[arg(long)]
    output: Utf8PathBuf,

    /// Columns that decide which duplicate survives, highest value first
    #[arg(long)]
    priority: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MasstError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MasstError) -> u8 {
    match error {
        MasstError::InvalidUsi(_)
        | MasstError::InvalidDatabase(_)
        | MasstError::UnknownOntology(_)
        | MasstError::MissingConfig(_)
        | MasstError::ConfigRead(_)
        | MasstError::ConfigParse(_)
        | MasstError::InvalidOntology { .. }
        | MasstError::MissingColumn { .. } => 2,
        MasstError::SearchHttp(_)
        | MasstError::SearchStatus { .. }
        | MasstError::SearchResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Query(args) => run_query(args, config, output_mode),
        Commands::Batch(args) => run_batch(args, config, output_mode),
        Commands::Enrich(args) => run_enrich(args, config, output_mode),
        Commands::Summary(args) => run_summary(args, config, output_mode),
        Commands::Tree(TreeArgs {
            command: TreeCommand::Update(args),
        }) => run_tree_update(args, config, output_mode),
        Commands::Metadata(MetadataArgs {
            command: MetadataCommand::Check(args),
        }) => run_metadata_check(args, config, output_mode),
    }
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &TracingSink,
    }
}

fn query_options(config: &ResolvedConfig, search: &SearchArgs, page: &PageArgs) -> QueryOptions {
    let defaults = &config.search;
    QueryOptions {
        search: SearchParameters {
            database: search.database.unwrap_or(defaults.database),
            library: search.library.unwrap_or(defaults.library),
            precursor_mz_tol: search.precursor_mz_tol.unwrap_or(defaults.precursor_mz_tol),
            mz_tol: search.mz_tol.unwrap_or(defaults.mz_tol),
            min_cos: search.min_cos.unwrap_or(defaults.min_cos),
            min_matched_signals: search.min_matched_signals.unwrap_or(defaults.min_matched_signals),
            analog: search.analog || defaults.analog,
            analog_mass_below: search.analog_mass_below.unwrap_or(defaults.analog_mass_below),
            analog_mass_above: search.analog_mass_above.unwrap_or(defaults.analog_mass_above),
        },
        best_match_per_file: !search.all_matches_per_file,
        output: OutputOptions {
            pretty: page.pretty,
            html_template: page.html_template.clone(),
        },
    }
}

fn http_app(config: ResolvedConfig, search: &SearchArgs) -> miette::Result<App<FasstHttpClient>> {
    let mut settings = config.client.clone();
    if search.no_cache {
        settings.cache_expiry_hours = None;
    }
    let client = FasstHttpClient::new(&settings)?;
    Ok(App::new(client, config))
}

fn run_query(
    args: QueryArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = query_options(&config, &args.search, &args.page);
    let app = http_app(config, &args.search)?;
    let request = QueryRequest {
        input: args.input,
        compound_name: args.compound_name,
        out: args.out,
    };
    let result = app.query(&request, &options, sink_for(output_mode))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_query(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_query(&result),
    }
    Ok(())
}

fn run_batch(
    args: BatchArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = query_options(&config, &args.search, &args.page);
    let app = http_app(config, &args.search)?;
    let request = BatchRequest {
        table: args.table,
        out: args.out,
        id_column: args.id_column,
        name_column: Some(args.name_column),
        separator: args.separator,
        parallel_queries: args.parallel_queries,
    };
    let result = app.batch(&request, &options, sink_for(output_mode))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_batch(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_batch(&result),
    }
    Ok(())
}

fn run_enrich(
    args: EnrichArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(OfflineClient, config);
    let output = OutputOptions {
        pretty: args.pretty,
        html_template: None,
    };
    let result = app.enrich(
        &args.matches,
        &args.out,
        &args.ontologies,
        &output,
        sink_for(output_mode),
    )?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_enrich(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_enrich(&result),
    }
    Ok(())
}

fn run_summary(
    args: SummaryArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(OfflineClient, config);
    let request = SummaryRequest {
        batch_out: args.batch_out,
        out: args.out,
        ontologies: args.ontologies,
        min_matches: args.min_matches,
        quant_table: args.quant_table,
    };
    let result = app.summarize(&request, sink_for(output_mode))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_summary(&result),
    }
    Ok(())
}

fn run_tree_update(
    args: TreeUpdateArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(OfflineClient, config);
    let result = app.update_tree(&args.ontology, args.orphans.as_deref(), sink_for(output_mode))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_tree_update(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_tree_update(&result),
    }
    Ok(())
}

fn run_metadata_check(
    args: MetadataCheckArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = App::new(OfflineClient, config);
    let result = app.check_metadata(&args.table, &args.output, &args.priority)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_metadata_check(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_metadata_check(&result),
    }
    Ok(())
}

fn parse_separator(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => Err(format!("separator must be a single character or `tab`, got `{other}`")),
    }
}

/// Client for commands that never search.
struct OfflineClient;

impl FasstClient for OfflineClient {
    fn search(&self, _query: &SearchQuery) -> Result<Value, MasstError> {
        Err(MasstError::SearchHttp("fastMASST client not configured".to_string()))
    }
}
