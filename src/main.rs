use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use theseus::artifacts::RunLayout;
use theseus::models::normalize;
use theseus::pipeline::{self, PipelineConfig};
use theseus::stats::PipelineStats;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "theseus")]
#[command(about = "Extract a Wikipedia category subtree and its articles from dump files")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the filtered dump
    Extract(ExtractArgs),
    /// Parse the link export into the category graph cache and article table
    Index(IndexArgs),
    /// Walk the category graph and report depths without touching the XML dump
    Explore(ExploreArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Path to the categorylinks/page join export (.csv)
    #[arg(short, long)]
    links: PathBuf,

    /// Directory for the category graph cache and article table
    #[arg(long, default_value = "resources")]
    cache_dir: PathBuf,

    /// Rebuild even if a valid cache exists
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct ExploreArgs {
    #[command(flatten)]
    index: IndexArgs,

    /// Seed category (underscores or spaces)
    #[arg(short, long)]
    category: String,

    /// Maximum subcategory depth (unbounded if omitted)
    #[arg(long)]
    max_depth: Option<u32>,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    explore: ExploreArgs,

    /// Path to the pages-articles dump (.xml or .xml.bz2)
    #[arg(short, long)]
    dump: PathBuf,

    /// Output directory; each run gets its own subdirectory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
}

fn run_index(args: IndexArgs) -> Result<()> {
    let stats = PipelineStats::new();
    let start = Instant::now();
    let graph = pipeline::load_or_build_graph(&args.links, &args.cache_dir, !args.no_cache, &stats)?;

    println!();
    println!("=== Summary ===");
    println!("Indexing time:      {:.2}s", start.elapsed().as_secs_f64());
    println!("Categories:         {}", graph.category_count());
    println!("Category edges:     {}", graph.edge_count());
    println!("Rows read:          {}", stats.rows());
    println!("Article rows:       {}", stats.article_rows());
    println!("Malformed rows:     {}", stats.malformed());
    Ok(())
}

fn run_explore(args: ExploreArgs) -> Result<()> {
    let stats = PipelineStats::new();
    let graph = pipeline::load_or_build_graph(
        &args.index.links,
        &args.index.cache_dir,
        !args.index.no_cache,
        &stats,
    )?;
    let seed = normalize(&args.category);
    let depths = theseus::depth::explore(&graph, &seed, args.max_depth);

    let mut per_level: BTreeMap<u32, usize> = BTreeMap::new();
    for (_, depth) in depths.sorted() {
        *per_level.entry(depth).or_default() += 1;
    }

    println!();
    println!("=== Categories under '{}' ===", seed);
    for (depth, count) in &per_level {
        println!("Depth {:>3}:          {}", depth, count);
    }
    println!("Total:              {}", depths.len());
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let config = PipelineConfig {
        links_path: args.explore.index.links,
        dump_path: args.dump,
        cache_dir: args.explore.index.cache_dir,
        output_root: args.output,
        seed: args.explore.category,
        max_depth: args.explore.max_depth,
        use_cache: !args.explore.index.no_cache,
    };

    let stats = PipelineStats::new();
    let start = Instant::now();
    let output = pipeline::run(&config, &stats)?;
    let layout = RunLayout::new(&config.output_root, &normalize(&config.seed), config.max_depth);
    info!(output = %output.display(), "Pipeline finished");

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Run directory:      {}", layout.dir().display());
    println!("Output:             {}", output.display());
    println!();
    println!("Categories reached: {}", stats.categories_reached());
    println!("Category/id pairs:  {}", stats.pairs());
    println!("Unique article ids: {}", stats.unique_ids());
    println!("Pages scanned:      {}", stats.pages_scanned());
    println!("Pages extracted:    {}", stats.pages_extracted());
    if stats.rows() > 0 {
        println!("Link rows read:     {}", stats.rows());
        println!("Malformed rows:     {}", stats.malformed());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Index(args) => run_index(args),
        Commands::Explore(args) => run_explore(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
