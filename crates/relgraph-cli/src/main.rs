//! relgraph CLI: index a repository and query its relationship graph.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use relgraph_core::config::{IndexConfig, COMMUNITY_FILE_NAME, GRAPH_FILE_NAME};
use relgraph_core::graph::{load_communities, GraphStore};
use relgraph_core::phases::communities::community_stats;
use relgraph_core::pipeline::{self, IndexReport};
use relgraph_core::subgraph::{extract_subgraph, SubgraphOptions};

/// Directory the index is written to, relative to the repository.
const DEFAULT_INDEX_DIR: &str = ".relgraph";

#[derive(Parser)]
#[command(
    name = "relgraph",
    about = "relgraph - Build and query a code relationship graph"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (edge weights, boundary caps, indexing defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GraphArgs {
    /// Index directory holding the persisted graph
    #[arg(short, long, default_value = DEFAULT_INDEX_DIR)]
    graph: PathBuf,
}

impl GraphArgs {
    fn load(&self) -> Result<GraphStore> {
        let path = self.graph.join(GRAPH_FILE_NAME);
        GraphStore::from_file(&path)
            .with_context(|| format!("failed to load graph from {}", path.display()))
    }

    fn communities(&self) -> Result<HashMap<String, usize>> {
        let path = self.graph.join(COMMUNITY_FILE_NAME);
        load_communities(&path)
            .with_context(|| format!("failed to load communities from {}", path.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a repository and persist its relationship graph
    Index {
        /// Path to the repository to index
        path: PathBuf,

        /// Output directory (defaults to <path>/.relgraph)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Louvain resolution parameter [default: 1.0]
        #[arg(long)]
        resolution: Option<f64>,

        /// Seed for the Louvain visiting order [default: 42]
        #[arg(long)]
        seed: Option<u64>,

        /// Extraction threads, 0 = one per core [default: 0]
        #[arg(long)]
        threads: Option<usize>,

        /// Additional directory or file names to exclude
        #[arg(long)]
        exclude: Vec<String>,

        /// Skip community detection
        #[arg(long)]
        no_communities: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Suppress all output except errors
        #[arg(long)]
        quiet: bool,
    },
    /// Breadth-first neighbourhood of a node
    Neighbors {
        #[command(flatten)]
        graph: GraphArgs,

        /// Chunk id or symbol name
        id: String,

        /// Relation names, e.g. calls,called_by,inherits
        #[arg(short, long, value_delimiter = ',', default_value = "calls,called_by")]
        relations: Vec<String>,

        #[arg(short, long, default_value = "1")]
        depth: usize,

        /// Expand higher-weight relations first
        #[arg(long)]
        weighted: bool,
    },
    /// Shortest directed path between two nodes
    Path {
        #[command(flatten)]
        graph: GraphArgs,

        source: String,
        target: String,

        #[arg(long, default_value = "5")]
        max_hops: usize,

        /// Only follow these relation types
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Rank nodes by centrality
    Centrality {
        #[command(flatten)]
        graph: GraphArgs,

        /// degree, betweenness, closeness or pagerank
        #[arg(short, long, default_value = "pagerank")]
        method: String,

        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Summarise the persisted community map
    Communities {
        #[command(flatten)]
        graph: GraphArgs,
    },
    /// Extract the ordered subgraph around result ids as JSON
    Subgraph {
        #[command(flatten)]
        graph: GraphArgs,

        /// Result chunk ids
        #[arg(required = true)]
        results: Vec<String>,

        /// Also include these neighbour ids as context
        #[arg(long, value_delimiter = ',')]
        ego: Vec<String>,

        /// Omit edges leaving the subgraph
        #[arg(long)]
        no_boundary: bool,

        /// Annotate nodes with this centrality measure
        #[arg(long)]
        centrality: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| run(cli.command, config));
    if let Err(e) = result {
        eprintln!("{} {e:#}", style("error:").red().bold());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<IndexConfig> {
    match path {
        Some(path) => IndexConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => Ok(IndexConfig::default()),
    }
}

fn run(command: Commands, config: IndexConfig) -> Result<()> {
    match command {
        Commands::Index {
            path,
            output,
            resolution,
            seed,
            threads,
            exclude,
            no_communities,
            json,
            quiet,
        } => {
            let repo_path = path
                .canonicalize()
                .with_context(|| format!("repository not found: {}", path.display()))?;
            let output_dir = output.unwrap_or_else(|| repo_path.join(DEFAULT_INDEX_DIR));
            let mut config = IndexConfig {
                repo_path: repo_path.to_string_lossy().to_string(),
                output_dir: Some(output_dir.to_string_lossy().to_string()),
                ..config
            };
            config.exclude_patterns.extend(exclude);
            if let Some(resolution) = resolution {
                config.resolution = resolution;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if no_communities {
                config.detect_communities = false;
            }
            run_index(&config, json, quiet)
        }
        Commands::Neighbors {
            graph,
            id,
            relations,
            depth,
            weighted,
        } => {
            let store = graph.load()?;
            let relations: Vec<&str> = relations.iter().map(String::as_str).collect();
            let weights = weighted.then_some(&config.edge_weights);
            let neighbours = store.get_neighbors(&id, &relations, depth, weights);
            if neighbours.is_empty() {
                println!("{}", style("No neighbours found").dim());
            }
            for n in neighbours {
                println!("{n}");
            }
            Ok(())
        }
        Commands::Path {
            graph,
            source,
            target,
            max_hops,
            types,
        } => {
            let store = graph.load()?;
            let types: Vec<&str> = types.iter().map(String::as_str).collect();
            let filter = (!types.is_empty()).then_some(types.as_slice());
            match store.find_path(&source, &target, max_hops, filter) {
                Some(path) => {
                    for (i, id) in path.iter().enumerate() {
                        println!("  {:>2}. {id}", i);
                    }
                }
                None => println!(
                    "{}",
                    style(format!("No path within {max_hops} hops")).yellow()
                ),
            }
            Ok(())
        }
        Commands::Centrality { graph, method, top } => {
            let store = graph.load()?;
            let scores = store.compute_centrality(&method)?;
            let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (id, score) in ranked.into_iter().take(top) {
                println!("  {score:>8.4}  {id}");
            }
            Ok(())
        }
        Commands::Communities { graph } => {
            let communities = graph.communities()?;
            let stats = community_stats(&communities);
            println!("  {:<14} {}", "Communities:", stats.count);
            println!("  {:<14} {:.1}", "Average size:", stats.avg_size);
            println!("  {:<14} {}", "Largest:", stats.largest);
            println!("  {:<14} {}", "Smallest:", stats.smallest);
            Ok(())
        }
        Commands::Subgraph {
            graph,
            results,
            ego,
            no_boundary,
            centrality,
        } => {
            let store = graph.load()?;
            // The community map is optional context.
            let communities = graph.communities().ok();
            let scores = centrality
                .map(|method| store.compute_centrality(&method))
                .transpose()?;
            let mut options = SubgraphOptions::from_config(&config);
            if no_boundary {
                options.include_boundary_edges = false;
            }
            let sub = extract_subgraph(
                &store,
                &results,
                &ego,
                scores.as_ref(),
                communities.as_ref(),
                &options,
            );
            println!("{}", serde_json::to_string_pretty(&sub)?);
            Ok(())
        }
    }
}

fn run_index(config: &IndexConfig, json: bool, quiet: bool) -> Result<()> {
    if quiet || json {
        let output = pipeline::run_pipeline(config, None).context("indexing failed")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&output.report)?);
        }
        return Ok(());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .context("invalid progress template")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message("Initialising...");
    pb.enable_steady_tick(std::time::Duration::from_millis(80));

    let progress: pipeline::ProgressCallback = {
        let pb = pb.clone();
        Box::new(move |_name, label| {
            pb.set_message(label.to_string());
        })
    };

    let start = Instant::now();
    let result = pipeline::run_pipeline(config, Some(progress));
    pb.finish_and_clear();
    let output = result.context("indexing failed")?;

    print_summary(config, &output.report, start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn print_summary(config: &IndexConfig, report: &IndexReport, duration_ms: f64) {
    let stats = &report.stats;
    println!(
        "\n{}  relgraph index: {}",
        style("✓").green().bold(),
        style(
            Path::new(&config.repo_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        )
        .bold()
    );
    println!("  {:<14} {}", "Files:", stats.files);
    println!("  {:<14} {}", "Chunks:", stats.chunks);
    println!("  {:<14} {}", "Edges:", stats.edges);
    println!(
        "  {:<14} {} of {}",
        "Resolved:", stats.resolved_targets, stats.edges
    );
    println!("  {:<14} {}", "Phantoms:", stats.phantoms);
    if config.detect_communities {
        println!(
            "  {:<14} {} (modularity {:.3})",
            "Communities:", stats.communities.count, stats.modularity
        );
    }
    if stats.failed_chunks > 0 {
        println!(
            "  {:<14} {}",
            style("Failed:").yellow(),
            stats.failed_chunks
        );
    }
    println!("  {:<14} {:.1}ms", "Duration:", duration_ms);

    if log::log_enabled!(log::Level::Debug) {
        println!("\n  Phase Timings:");
        for (phase, secs) in &report.timings {
            println!("    {:<14} {:.1}ms", phase, secs * 1000.0);
        }
    }

    if let Some(path) = &report.graph_path {
        println!("\n  {} {}", style("Graph written to:").green(), path);
    }
}
