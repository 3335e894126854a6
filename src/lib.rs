//! Theseus: Wikipedia category subtree extraction
//!
//! Given a seed category and a depth bound, this crate pulls every article in
//! the category and its subcategories out of a Wikipedia dump into a small,
//! standalone bzip2-compressed MediaWiki export.
//!
//! The pipeline runs four stages, each feeding the next:
//!
//! 1. **Indexing** -- Parse the categorylinks/page CSV export once into a
//!    category graph and an `id,title,category` article table
//! 2. **Exploration** -- Breadth-first walk of the category graph from the seed,
//!    recording the minimal depth of every category within the bound
//! 3. **Collection** -- Stream the article table and keep the ids of articles in
//!    reached categories
//! 4. **Extraction** -- One forward pass over the XML dump, copying the selected
//!    pages with their wikitext cleaned up
//!
//! Every stage leaves an artifact behind so a rerun with the same inputs skips
//! the work already done.
//!
//! # Key Modules
//!
//! - [`dialect`] -- CSV dialect guessing for the link export
//! - [`index`] -- Category graph and article table from the link export
//! - [`depth`] -- Depth-bounded category graph traversal
//! - [`collect`] -- Article id collection for reached categories
//! - [`parser`] -- Streaming XML reader with BZ2 decompression
//! - [`content`] -- Wikitext cleanup
//! - [`extract`] -- Filtered, compressed export writer
//! - [`cache`] -- Category graph persistence with staleness checks
//! - [`artifacts`] -- Per-run depth map, category links and article index files
//! - [`pipeline`] -- Stage orchestration
//! - [`models`] -- Core data types
//! - [`stats`] -- Pipeline counters
//! - [`error`] -- Pipeline fault kinds
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! theseus -v extract \
//!     --links resources/categorylinkspage-join.csv \
//!     --dump resources/enwiki-20190101-pages-articles-multistream.xml.bz2 \
//!     --category Computer_hardware --max-depth 10 -o output/
//! ```

pub mod artifacts;
pub mod cache;
pub mod collect;
pub mod config;
pub mod content;
pub mod depth;
pub mod dialect;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod stats;
