use crate::config::{
    ARTICLE_NAMESPACE, CATEGORY_NAMESPACE, COL_CATEGORY, COL_NAMESPACE, COL_PAGE_ID, COL_TITLE,
    MIN_LINK_FIELDS, PROGRESS_INTERVAL, WRITE_BUFFER_SIZE,
};
use crate::dialect::{self, latin1};
use crate::error::{ensure_input, ExtractError};
use crate::models::normalize;
use crate::stats::PipelineStats;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

/// Category name -> subcategory names, in the order the export lists them.
///
/// Every category that shows up as a child also has an entry of its own, so a
/// leaf category maps to an empty list rather than being absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryGraph {
    children: FxHashMap<String, Vec<String>>,
}

impl CategoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(children: FxHashMap<String, Vec<String>>) -> Self {
        Self { children }
    }

    /// Builds a graph from `(parent, child)` pairs, in order.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = Self::new();
        for (parent, child) in edges {
            graph.add_edge(parent, child);
        }
        graph
    }

    pub fn add_edge(&mut self, parent: &str, child: &str) {
        match self.children.get_mut(parent) {
            Some(list) => list.push(child.to_string()),
            None => {
                self.children
                    .insert(parent.to_string(), vec![child.to_string()]);
            }
        }
        if !self.children.contains_key(child) {
            self.children.insert(child.to_string(), Vec::new());
        }
    }

    pub fn children(&self, category: &str) -> Option<&[String]> {
        self.children.get(category).map(Vec::as_slice)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.children.contains_key(category)
    }

    pub fn category_count(&self) -> usize {
        self.children.len()
    }

    pub fn edge_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn as_map(&self) -> &FxHashMap<String, Vec<String>> {
        &self.children
    }
}

/// Parses the link export into the category graph, writing article assignments
/// to `articles_path` as `id,title,category` rows on the way.
pub fn build_index(
    links_path: &Path,
    articles_path: &Path,
    stats: &PipelineStats,
) -> Result<CategoryGraph> {
    ensure_input(links_path)?;
    info!("Indexing link export: {}", links_path.display());

    let reader = dialect::open_sniffed(links_path)?;

    if let Some(parent) = articles_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let tmp_path = articles_path.with_extension("csv.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create article table: {:?}", tmp_path))?;
    let mut articles = article_writer(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));

    let graph = index_rows(reader, &mut articles, stats)?;

    articles.flush().context("Failed to flush article table")?;
    drop(articles);
    fs::rename(&tmp_path, articles_path)
        .with_context(|| format!("Failed to move article table to: {:?}", articles_path))?;

    info!(
        categories = graph.category_count(),
        edges = graph.edge_count(),
        articles = stats.article_rows(),
        malformed = stats.malformed(),
        "Index built successfully"
    );
    Ok(graph)
}

pub fn article_writer<W: io::Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(inner)
}

/// Row loop of the indexer, independent of where the rows come from.
pub fn index_rows<R: io::Read, W: io::Write>(
    mut reader: csv::Reader<R>,
    articles: &mut csv::Writer<W>,
    stats: &PipelineStats,
) -> Result<CategoryGraph> {
    let mut graph = CategoryGraph::new();
    let pb = ProgressBar::new_spinner();

    for (n, result) in reader.byte_records().enumerate() {
        let row = n as u64 + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(e).context("Failed to read link export");
            }
            Err(e) => {
                skip_row(stats, ExtractError::malformed_row(row, e.to_string()));
                continue;
            }
        };
        stats.inc_rows();

        if record.len() < MIN_LINK_FIELDS {
            skip_row(
                stats,
                ExtractError::malformed_row(
                    row,
                    format!("expected {} fields, found {}", MIN_LINK_FIELDS, record.len()),
                ),
            );
            continue;
        }

        let namespace = &record[COL_NAMESPACE];
        if namespace == CATEGORY_NAMESPACE.as_bytes() {
            let parent = normalize(&latin1(&record[COL_CATEGORY]));
            let child = normalize(&latin1(&record[COL_TITLE]));
            graph.add_edge(&parent, &child);
            stats.inc_category_edges();
        } else if namespace == ARTICLE_NAMESPACE.as_bytes() {
            let category = normalize(&latin1(&record[COL_CATEGORY]));
            articles
                .write_record([
                    latin1(&record[COL_PAGE_ID]),
                    latin1(&record[COL_TITLE]),
                    category,
                ])
                .context("Failed to write article row")?;
            stats.inc_article_rows();
        }

        if row % PROGRESS_INTERVAL == 0 {
            pb.tick();
        }
    }

    pb.finish_and_clear();
    debug!(rows = stats.rows(), "Link export scanned");
    Ok(graph)
}

fn skip_row(stats: &PipelineStats, err: ExtractError) {
    warn!(error = %err, "Skipped row");
    stats.inc_malformed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn link_row(id: &str, ns: &str, title: &str, target: &str) -> String {
        let mut fields = vec![
            id.to_string(),
            ns.to_string(),
            title.to_string(),
        ];
        fields.extend((3..COL_CATEGORY).map(|i| format!("f{}", i)));
        fields.push(target.to_string());
        fields
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn run(data: &str) -> (CategoryGraph, String, PipelineStats) {
        let stats = PipelineStats::new();
        let reader = Dialect::default()
            .reader_builder()
            .from_reader(data.as_bytes());
        let mut articles = article_writer(Vec::new());
        let graph = index_rows(reader, &mut articles, &stats).unwrap();
        let table = String::from_utf8(articles.into_inner().unwrap()).unwrap();
        (graph, table, stats)
    }

    #[test]
    fn category_rows_become_edges() {
        let data = [
            link_row("10", "14", "Computer_memory", "Computer_hardware"),
            link_row("11", "14", "Input_devices", "Computer_hardware"),
        ]
        .join("\n");
        let (graph, _, stats) = run(&data);

        assert_eq!(
            graph.children("Computer hardware").unwrap(),
            &["Computer memory".to_string(), "Input devices".to_string()]
        );
        assert_eq!(graph.children("Computer memory").unwrap().len(), 0);
        assert_eq!(stats.category_edges(), 2);
    }

    #[test]
    fn article_rows_go_to_table() {
        let data = link_row("42", "0", "Hard_disk_drive", "Computer_storage_devices");
        let (graph, table, stats) = run(&data);

        assert_eq!(graph.category_count(), 0);
        assert_eq!(
            table.trim(),
            "\"42\",\"Hard_disk_drive\",\"Computer storage devices\""
        );
        assert_eq!(stats.article_rows(), 1);
    }

    #[test]
    fn other_namespaces_are_ignored() {
        let data = link_row("7", "6", "File:Chip.png", "Computer_hardware");
        let (graph, table, stats) = run(&data);
        assert_eq!(graph.category_count(), 0);
        assert!(table.is_empty());
        assert_eq!(stats.rows(), 1);
        assert_eq!(stats.malformed(), 0);
    }

    #[test]
    fn short_row_is_skipped_without_effect() {
        let good = link_row("10", "14", "Computer_memory", "Computer_hardware");
        let (baseline, baseline_table, _) = run(&good);

        let data = format!("{}\n\"99\",\"14\",\"Broken\"\n", good);
        let (graph, table, stats) = run(&data);

        assert_eq!(graph, baseline);
        assert_eq!(table, baseline_table);
        assert_eq!(stats.malformed(), 1);
        assert_eq!(stats.rows(), 2);
    }

    #[test]
    fn rerun_is_deterministic() {
        let data = [
            link_row("1", "14", "B", "A"),
            link_row("2", "14", "C", "A"),
            link_row("3", "0", "Art", "B"),
            link_row("4", "14", "A", "C"),
        ]
        .join("\n");
        let (g1, t1, _) = run(&data);
        let (g2, t2, _) = run(&data);
        assert_eq!(g1, g2);
        assert_eq!(t1, t2);
    }

    #[test]
    fn from_edges_registers_children() {
        let graph = CategoryGraph::from_edges([("A", "B"), ("B", "C")]);
        assert!(graph.contains("C"));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.category_count(), 3);
    }

    #[test]
    fn build_index_fails_on_missing_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let stats = PipelineStats::new();
        let err = build_index(
            &dir.path().join("absent.csv"),
            &dir.path().join("articles.csv"),
            &stats,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::MissingInput(_))
        ));
    }
}
