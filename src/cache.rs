use crate::config::{CACHE_VERSION, READ_BUFFER_SIZE};
use crate::index::CategoryGraph;
use anyhow::{Context, Result};
use bincode::Options;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Identifies the link export a cache was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub path: String,
    pub mtime_secs: u64,
    pub len: u64,
}

impl InputFingerprint {
    pub fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path)
            .with_context(|| format!("Cannot stat link export {}", path.display()))?;
        let mtime_secs = meta
            .modified()
            .context("Link export has no modification time")?
            .duration_since(UNIX_EPOCH)
            .context("Link export modification time predates the epoch")?
            .as_secs();
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            mtime_secs,
            len: meta.len(),
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    pub input: InputFingerprint,
    pub category_count: usize,
    pub edge_count: usize,
}

impl CacheMetadata {
    /// Why a cache built with this metadata cannot serve `input_path`, if at all.
    fn stale_reason(&self, input_path: &Path) -> Option<&'static str> {
        if self.version != CACHE_VERSION {
            return Some("format version changed");
        }
        if self.input.path != input_path.to_string_lossy() {
            return Some("built from a different link export");
        }
        match InputFingerprint::of(input_path) {
            Ok(current) if current != self.input => Some("link export modified"),
            Ok(_) => None,
            Err(e) => {
                // A missing export can't contradict the cache.
                warn!(error = %e, "Link export unavailable, using cached graph");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct StoredGraph {
    metadata: CacheMetadata,
    children: FxHashMap<String, Vec<String>>,
}

/// Borrows the adjacency lists so saving does not clone every category name.
#[derive(Serialize)]
struct StoredGraphRef<'a> {
    metadata: CacheMetadata,
    children: &'a FxHashMap<String, Vec<String>>,
}

fn links_stem(links_path: &Path) -> String {
    links_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "links".to_string())
}

pub fn graph_cache_path(cache_dir: &Path, links_path: &Path) -> PathBuf {
    cache_dir.join(format!("categories_{}.bin", links_stem(links_path)))
}

/// Where the indexer leaves the `id,title,category` rows for the article collector.
pub fn article_table_path(cache_dir: &Path, links_path: &Path) -> PathBuf {
    cache_dir.join(format!("articles_{}.csv", links_stem(links_path)))
}

/// Returns `Ok(Some(graph))` if the cache is valid, `Ok(None)` if missing or stale.
pub fn try_load_graph(cache_path: &Path, input_path: &Path) -> Result<Option<CategoryGraph>> {
    let Ok(file) = File::open(cache_path) else {
        debug!(path = ?cache_path, "No category graph cache");
        return Ok(None);
    };
    let limit = file.metadata().map(|m| m.len()).unwrap_or(0) + 1024;

    let stored: StoredGraph = match bincode::options()
        .with_limit(limit)
        .deserialize_from(BufReader::with_capacity(READ_BUFFER_SIZE, file))
    {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, path = ?cache_path, "Discarding unreadable category graph cache");
            return Ok(None);
        }
    };

    if let Some(reason) = stored.metadata.stale_reason(input_path) {
        info!(reason, path = ?cache_path, "Category graph cache is stale");
        return Ok(None);
    }

    info!(
        categories = stored.metadata.category_count,
        edges = stored.metadata.edge_count,
        "Category graph loaded from cache"
    );
    Ok(Some(CategoryGraph::from_map(stored.children)))
}

/// Serializes the graph by reference and writes atomically via rename.
pub fn save_graph(graph: &CategoryGraph, input_path: &Path, cache_path: &Path) -> Result<()> {
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create cache directory {}", parent.display()))?;
    }

    let stored = StoredGraphRef {
        metadata: CacheMetadata {
            version: CACHE_VERSION,
            input: InputFingerprint::of(input_path)?,
            category_count: graph.category_count(),
            edge_count: graph.edge_count(),
        },
        children: graph.as_map(),
    };

    let tmp_path = cache_path.with_extension("bin.tmp");
    let out = File::create(&tmp_path)
        .with_context(|| format!("Cannot create {}", tmp_path.display()))?;
    bincode::DefaultOptions::new()
        .serialize_into(BufWriter::new(out), &stored)
        .context("Failed to serialize category graph")?;
    fs::rename(&tmp_path, cache_path)
        .with_context(|| format!("Cannot move cache into place at {}", cache_path.display()))?;

    info!(
        categories = graph.category_count(),
        edges = graph.edge_count(),
        path = ?cache_path,
        "Category graph cache saved"
    );
    Ok(())
}
