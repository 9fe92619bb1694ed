use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use local_community::config::SearchConfig;
use local_community::query::{self, OutputFormat};
use local_community::{
    local_searcher, logger, run_queries, run_queries_parallel, CommunityDetector, EdgeListOptions, PartitionOptions,
    SearchMethod, StrengthMode, WeightedGraph,
};

#[derive(Debug, Parser)]
#[command(name = "local-community", version, about = "Local community search by structural strength.")]
struct Cli {
    /// Append log records to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find the community of every node listed in a query file.
    Search(SearchArgs),
    /// Partition the whole graph into communities.
    Detect(DetectArgs),
}

#[derive(Debug, Args)]
struct GraphArgs {
    /// Edge-list file, one edge per line.
    #[arg(short, long)]
    network: PathBuf,

    /// Column delimiter of the edge list (default: any whitespace).
    #[arg(short, long)]
    delimiter: Option<String>,

    /// Read a third column as the edge weight.
    #[arg(long)]
    weighted: bool,

    /// Strength formula.
    #[arg(short, long, value_enum)]
    strength: Option<StrengthMode>,

    /// YAML file with default settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Query node file, one id per line.
    #[arg(short, long)]
    queries: PathBuf,

    /// Objective of the search.
    #[arg(short, long, value_enum)]
    method: Option<SearchMethod>,

    /// Time budget of one search, in seconds.
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Do not amend communities smaller than three nodes.
    #[arg(long)]
    no_amend: bool,

    /// Run the queries on all cores, each worker on its own graph copy.
    #[arg(long)]
    parallel: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct DetectArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Keep outliers and tiny communities as they are.
    #[arg(long)]
    no_outliers: bool,

    /// Allow communities to overlap.
    #[arg(long)]
    overlap: bool,

    /// Random seed for picking start nodes (default: ascending id).
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &GraphArgs) -> Result<SearchConfig> {
    let mut config = match &args.config {
        Some(path) => SearchConfig::from_yaml_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => SearchConfig::default(),
    };
    if let Some(mode) = args.strength {
        config.strength_mode = mode;
    }
    if args.delimiter.is_some() {
        config.delimiter = args.delimiter.clone();
    }
    config.weighted |= args.weighted;
    Ok(config)
}

fn load_graph(path: &Path, config: &SearchConfig) -> Result<WeightedGraph> {
    let options = EdgeListOptions {
        delimiter: config.delimiter.clone(),
        weighted: config.weighted,
    };
    let graph = WeightedGraph::from_edge_list_file(path, &options)
        .with_context(|| format!("failed to load graph {}", path.display()))?;
    info!("Loaded graph {}: {}", path.display(), graph.print_info());
    Ok(graph)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn search(args: SearchArgs) -> Result<()> {
    let mut config = load_config(&args.graph)?;
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config.amend_small &= !args.no_amend;
    config.parallel |= args.parallel;
    config.validate()?;

    let mut graph = load_graph(&args.graph.network, &config)?;
    let queries = query::read_query_nodes(&args.queries)
        .with_context(|| format!("failed to read queries {}", args.queries.display()))?;
    info!(
        "There are {} query nodes, method {}, strength mode {}, timeout {}s",
        queries.len(),
        config.method,
        config.strength_mode,
        config.timeout_secs
    );

    let start = Instant::now();
    let outcomes = if config.parallel {
        run_queries_parallel(
            &graph,
            &queries,
            config.method,
            config.strength_mode,
            config.timeout_secs,
            config.amend_small,
            config.parallel_chunk,
        )
    } else {
        let mut searcher = local_searcher(&mut graph, config.method, config.strength_mode, config.timeout_secs);
        run_queries(searcher.as_mut(), &queries, config.amend_small)
    };
    let found = outcomes.iter().filter(|(_, outcome)| outcome.is_found()).count();
    info!(
        "Elapsed time = {} milliseconds, {} of {} queries found a community",
        start.elapsed().as_millis(),
        found,
        outcomes.len()
    );

    let mut writer = open_output(args.graph.output.as_deref())?;
    query::write_outcomes(&mut writer, &outcomes, args.format)?;
    Ok(())
}

fn detect(args: DetectArgs) -> Result<()> {
    let mut config = load_config(&args.graph)?;
    config.merge_outliers &= !args.no_outliers;
    config.detect_overlap |= args.overlap;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    let mut graph = load_graph(&args.graph.network, &config)?;
    let options = PartitionOptions {
        strength_mode: config.strength_mode,
        merge_outliers: config.merge_outliers,
        detect_overlap: config.detect_overlap,
        seed: config.seed,
    };

    let start = Instant::now();
    let partition = CommunityDetector::new(&mut graph, options).detect()?;
    info!("Elapsed time = {} milliseconds", start.elapsed().as_millis());

    let mut writer = open_output(args.graph.output.as_deref())?;
    query::write_partition(&mut writer, &partition)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.log_file.as_deref()).map_err(|e| anyhow!("failed to initialise logger: {}", e))?;

    match cli.command {
        Command::Search(args) => search(args),
        Command::Detect(args) => detect(args),
    }
}
