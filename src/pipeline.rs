use crate::artifacts::{self, RunLayout};
use crate::cache;
use crate::collect::collect_article_ids;
use crate::depth::{self, DepthMap};
use crate::error::ensure_input;
use crate::extract::run_extraction;
use crate::index::{build_index, CategoryGraph};
use crate::models::{normalize, ArticleIndex};
use crate::stats::PipelineStats;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

pub struct PipelineConfig {
    pub links_path: PathBuf,
    pub dump_path: PathBuf,
    pub cache_dir: PathBuf,
    pub output_root: PathBuf,
    pub seed: String,
    pub max_depth: Option<u32>,
    /// Reuse artifacts from earlier runs when present
    pub use_cache: bool,
}

/// Stage 1: the category graph, from cache when it is still valid for the link
/// export and the article table next to it exists.
pub fn load_or_build_graph(
    links_path: &Path,
    cache_dir: &Path,
    use_cache: bool,
    stats: &PipelineStats,
) -> Result<CategoryGraph> {
    let cache_path = cache::graph_cache_path(cache_dir, links_path);
    let table_path = cache::article_table_path(cache_dir, links_path);

    if use_cache && table_path.is_file() {
        if let Some(graph) = cache::try_load_graph(&cache_path, links_path)? {
            return Ok(graph);
        }
    }

    info!("Building category index (cache miss or disabled)");
    let start = Instant::now();
    let graph = build_index(links_path, &table_path, stats)?;
    info!(duration_secs = start.elapsed().as_secs_f64(), "Indexing complete");

    if let Err(e) = cache::save_graph(&graph, links_path, &cache_path) {
        warn!(error = %e, "Failed to save category graph cache");
    }
    Ok(graph)
}

/// Stages 1 and 2: the depth map for `seed`, reusing the stored one when present.
pub fn load_or_explore(
    config: &PipelineConfig,
    layout: &RunLayout,
    seed: &str,
    stats: &PipelineStats,
) -> Result<DepthMap> {
    let depth_path = layout.depth_map();
    if config.use_cache && depth_path.is_file() {
        return artifacts::load_depth_map(&depth_path);
    }

    let graph = load_or_build_graph(&config.links_path, &config.cache_dir, config.use_cache, stats)?;
    let depths = depth::explore(&graph, seed, config.max_depth);
    artifacts::save_depth_map(&depths, &depth_path)?;
    artifacts::save_category_links(
        &depth::restrict(&graph, &depths),
        &depths,
        &layout.category_links(),
    )?;
    Ok(depths)
}

/// Stage 3: the article index, reusing the stored one when present.
pub fn load_or_collect(
    config: &PipelineConfig,
    layout: &RunLayout,
    depths: &DepthMap,
    stats: &PipelineStats,
) -> Result<ArticleIndex> {
    let json_path = layout.article_index_json();
    if config.use_cache && json_path.is_file() {
        return artifacts::load_article_index(&json_path);
    }

    let table_path = cache::article_table_path(&config.cache_dir, &config.links_path);
    if !table_path.is_file() {
        // Only the article table is needed here; the graph comes along with it.
        load_or_build_graph(&config.links_path, &config.cache_dir, config.use_cache, stats)?;
    }

    let index = collect_article_ids(&table_path, depths, stats)?;
    artifacts::save_article_index(&index, &json_path, &layout.article_index_csv())?;
    Ok(index)
}

/// Runs the whole pipeline and returns the path of the filtered export.
pub fn run(config: &PipelineConfig, stats: &PipelineStats) -> Result<PathBuf> {
    // Fail before spending minutes on the link export.
    ensure_input(&config.dump_path)?;

    let seed = normalize(&config.seed);
    let layout = RunLayout::new(&config.output_root, &seed, config.max_depth);
    info!(
        seed = %seed,
        max_depth = ?config.max_depth,
        run_dir = %layout.dir().display(),
        "Starting pipeline"
    );

    let depths = load_or_explore(config, &layout, &seed, stats)?;
    stats.set_categories_reached(depths.len() as u64);

    let index = load_or_collect(config, &layout, &depths, stats)?;
    drop(depths);

    let targets = index.target_ids();
    stats.set_targets(index.pair_count() as u64, targets.len() as u64);
    drop(index);

    let output = layout.articles_xml();
    let start = Instant::now();
    run_extraction(&config.dump_path, &output, &targets, stats)?;
    info!(duration_secs = start.elapsed().as_secs_f64(), "Extraction complete");

    Ok(output)
}
