//! Per-run artifacts: the depth map, the reached part of the category graph,
//! the article index and the final filtered export, all under one run directory
//! named after the seed and depth bound.

use crate::config::WRITE_BUFFER_SIZE;
use crate::depth::DepthMap;
use crate::index::CategoryGraph;
use crate::models::ArticleIndex;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct RunLayout {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl RunLayout {
    pub fn new(output_root: &Path, seed: &str, max_depth: Option<u32>) -> Self {
        let prefix = seed.replace(' ', "_");
        let suffix = match max_depth {
            Some(depth) => format!("d{}", depth),
            None => "dall".to_string(),
        };
        Self {
            dir: output_root.join(format!("{}-{}", prefix, suffix)),
            prefix,
            suffix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, kind: &str, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}-{}.{}", self.prefix, kind, self.suffix, ext))
    }

    pub fn depth_map(&self) -> PathBuf {
        self.file("category_to_depth", "csv")
    }

    pub fn category_links(&self) -> PathBuf {
        self.file("categorylinks", "csv")
    }

    pub fn article_index_json(&self) -> PathBuf {
        self.file("category_to_articleids", "json")
    }

    pub fn article_index_csv(&self) -> PathBuf {
        self.file("category_to_articleids", "csv")
    }

    pub fn articles_xml(&self) -> PathBuf {
        self.file("articles", "xml.bz2")
    }
}

/// Writes through a temporary sibling and renames it into place.
/// Writes `path` through a `.tmp` sibling that is renamed into place only once
/// `write` has succeeded and the buffer is flushed.
pub(crate) fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", tmp_path))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    write(&mut writer)?;
    writer.flush().context("Failed to flush artifact")?;
    drop(writer);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {:?}", path))?;
    info!(path = ?path, "Saved artifact");
    Ok(())
}

fn quoted_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .flexible(true)
        .from_writer(inner)
}

/// `category,depth` rows, ordered by depth then name.
pub fn save_depth_map(depths: &DepthMap, path: &Path) -> Result<()> {
    write_atomic(path, |out| {
        let mut writer = quoted_writer(out);
        let mut depth = itoa::Buffer::new();
        for (category, d) in depths.sorted() {
            writer.write_record([category, depth.format(d)])?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn load_depth_map(path: &Path) -> Result<DepthMap> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open depth map: {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(BufReader::new(file));

    let mut depths = FxHashMap::default();
    for (n, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Bad depth map row {}", n + 1))?;
        let (Some(category), Some(depth)) = (record.get(0), record.get(1)) else {
            anyhow::bail!("Depth map row {} has fewer than 2 fields", n + 1);
        };
        let depth: u32 = depth
            .trim()
            .parse()
            .with_context(|| format!("Bad depth '{}' on row {}", depth, n + 1))?;
        depths.insert(category.to_string(), depth);
    }
    info!(categories = depths.len(), "Depth map loaded from {}", path.display());
    Ok(DepthMap::from_map(depths))
}

/// `category,sub1,sub2,…` rows for every reached category, ordered like the depth map.
pub fn save_category_links(links: &CategoryGraph, depths: &DepthMap, path: &Path) -> Result<()> {
    write_atomic(path, |out| {
        let mut writer = quoted_writer(out);
        for (category, _) in depths.sorted() {
            if let Some(children) = links.children(category) {
                let row = std::iter::once(category).chain(children.iter().map(String::as_str));
                writer.write_record(row)?;
            }
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn save_article_index(index: &ArticleIndex, json_path: &Path, csv_path: &Path) -> Result<()> {
    write_atomic(json_path, |out| {
        serde_json::to_writer(out, index).context("Failed to serialize article index")?;
        Ok(())
    })?;

    write_atomic(csv_path, |out| {
        let mut writer = quoted_writer(out);
        for (category, ids) in index.iter() {
            let mut record = csv::StringRecord::new();
            record.push_field(category);
            let mut buf = itoa::Buffer::new();
            for id in ids {
                record.push_field(buf.format(*id));
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn load_article_index(json_path: &Path) -> Result<ArticleIndex> {
    let file = File::open(json_path)
        .with_context(|| format!("Failed to open article index: {}", json_path.display()))?;
    let index: ArticleIndex = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse article index: {}", json_path.display()))?;
    info!(
        categories = index.category_count(),
        pairs = index.pair_count(),
        "Article index loaded"
    );
    Ok(index)
}
