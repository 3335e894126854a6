use crate::config::{PROGRESS_INTERVAL, READ_BUFFER_SIZE};
use crate::depth::DepthMap;
use crate::error::{ensure_input, ExtractError};
use crate::models::ArticleIndex;
use crate::stats::PipelineStats;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Streams the `id,title,category` article table and buckets the ids of every
/// article whose category was reached by the depth walk.
pub fn collect_article_ids(
    articles_path: &Path,
    depths: &DepthMap,
    stats: &PipelineStats,
) -> Result<ArticleIndex> {
    ensure_input(articles_path)?;
    info!("Collecting article ids from: {}", articles_path.display());

    let file = File::open(articles_path)
        .with_context(|| format!("Failed to open article table: {}", articles_path.display()))?;
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file));

    let index = collect_rows(reader, depths)?;

    let unique = index.target_ids().len();
    stats.set_targets(index.pair_count() as u64, unique as u64);
    info!(
        categories = index.category_count(),
        pairs = index.pair_count(),
        unique_ids = unique,
        "Article ids collected"
    );
    Ok(index)
}

pub fn collect_rows<R: io::Read>(mut reader: csv::Reader<R>, depths: &DepthMap) -> Result<ArticleIndex> {
    let mut index = ArticleIndex::new();
    let pb = ProgressBar::new_spinner();

    for (n, result) in reader.records().enumerate() {
        let row = n as u64 + 1;
        if row % PROGRESS_INTERVAL == 0 {
            pb.tick();
        }
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(e).context("Failed to read article table");
            }
            Err(e) => {
                skip_row(ExtractError::malformed_row(row, e.to_string()));
                continue;
            }
        };

        let (Some(id), Some(category)) = (record.get(0), record.get(2)) else {
            skip_row(ExtractError::malformed_row(
                row,
                format!("expected 3 fields, found {}", record.len()),
            ));
            continue;
        };

        if !depths.contains(category) {
            continue;
        }

        match id.trim().parse::<u64>() {
            Ok(id) => index.push(category, id),
            Err(_) => skip_row(ExtractError::malformed_row(
                row,
                format!("non-numeric article id '{}'", id),
            )),
        }
    }

    pb.finish_and_clear();
    Ok(index)
}

fn skip_row(err: ExtractError) {
    warn!(error = %err, "Skipped article row");
}
